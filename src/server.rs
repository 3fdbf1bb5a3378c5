use crate::command::CommandDispatcher;
use crate::stats::StatsSource;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket};

/// 单次请求的最大字节数
pub const REQUEST_CAPACITY: usize = 512;

/// 配置结构
#[derive(Debug, Clone)]
pub struct Config {
    /// 服务端绑定地址
    pub bind_address: String,
    /// 服务端端口
    pub port: u16,
    /// 监听队列长度
    pub backlog: u32,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5001,
            backlog: 5,
        }
    }
}

impl Config {
    /// 构建服务器地址
    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("无效的地址格式: {}:{}", self.bind_address, self.port))
    }
}

/// 定长请求缓冲区
///
/// 容量固定为 [`REQUEST_CAPACITY`]，只做一次读取，超出部分留在套接字里不读。
pub struct RequestBuffer {
    data: [u8; REQUEST_CAPACITY],
    len: usize,
}

impl Default for RequestBuffer {
    #[inline]
    fn default() -> Self {
        Self {
            data: [0; REQUEST_CAPACITY],
            len: 0,
        }
    }
}

impl RequestBuffer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        REQUEST_CAPACITY
    }

    /// 已读入的请求内容
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// 从连接读取一次，返回读到的字节数（0 表示对端已关闭）
    pub async fn read_once<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.len = 0;
        let n = reader.read(&mut self.data).await?;
        self.len = n;
        Ok(n)
    }
}

/// 单个连接的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// 已写出完整回复
    Replied,
    /// 对端未发送数据即关闭
    EmptyRequest,
    ReadFailed,
    WriteFailed,
}

/// 处理一个连接：读一次、分发、写回复、关闭
///
/// 连接在所有路径上都会随 `stream` 一起释放；读取失败或读到 EOF 时不写回复。
pub async fn handle_connection<T, S>(
    mut stream: T,
    dispatcher: &CommandDispatcher<S>,
) -> ConnectionOutcome
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: StatsSource,
{
    let mut request = RequestBuffer::new();

    match request.read_once(&mut stream).await {
        Ok(0) => {
            debug!("对端未发送请求即关闭连接");
            return ConnectionOutcome::EmptyRequest;
        }
        Ok(n) => debug!("收到 {n} 字节请求"),
        Err(e) => {
            warn!("读取请求失败: {e}");
            return ConnectionOutcome::ReadFailed;
        }
    }

    let reply = dispatcher.dispatch(request.as_bytes());

    if let Err(e) = stream.write_all(reply.as_bytes()).await {
        warn!("写入回复失败: {e}");
        return ConnectionOutcome::WriteFailed;
    }

    if let Err(e) = stream.shutdown().await {
        debug!("关闭连接写端失败: {e}");
    }

    ConnectionOutcome::Replied
}

/// 状态服务器
///
/// 每个连接由一个独立的后台任务处理，接受循环从不等待任务结束。
/// 连接数不设上限，读写也没有超时。
pub struct StatusServer<S> {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S: StatsSource + 'static> StatusServer<S> {
    /// 创建套接字、绑定并开始监听
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn bind(config: &Config, dispatcher: CommandDispatcher<S>) -> Result<Self> {
        let addr = config.address()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("创建套接字失败")?;

        socket
            .set_reuseaddr(true)
            .context("设置 SO_REUSEADDR 失败")?;
        socket
            .bind(addr)
            .with_context(|| format!("绑定 {addr} 失败"))?;
        let listener = socket
            .listen(config.backlog)
            .with_context(|| format!("监听 {addr} 失败"))?;

        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// 实际监听的地址
    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("获取监听地址失败")
    }

    /// 运行接受循环
    ///
    /// 只有在 accept 失败时才返回，返回的错误视为致命的通信错误。
    pub async fn run(self) -> Result<()> {
        info!("服务器运行在: {}", self.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await.map_err(|e| {
                error!("接受连接失败: {e}");
                anyhow::Error::new(e).context("接受连接失败")
            })?;
            debug!("接受来自 {peer} 的连接");

            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let outcome = handle_connection(stream, &dispatcher).await;
                debug!("连接 {peer} 已关闭: {outcome:?}");
            });
        }
    }
}
