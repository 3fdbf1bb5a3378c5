use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// 内核 CPU 统计文件
pub const PROC_STAT_PATH: &str = "/proc/stat";
/// 内核内存统计文件
pub const PROC_MEMINFO_PATH: &str = "/proc/meminfo";

/// `/proc/stat` 汇总行的前缀
const CPU_LINE_PREFIX: &str = "cpu";
/// 汇总行中计数器的个数
const CPU_FIELD_COUNT: usize = 10;
/// 参与计算的 `/proc/meminfo` 行数
const MEMINFO_LINE_COUNT: usize = 5;

/// CPU 时间统计（单位：时钟滴答）
///
/// 字段顺序与 `/proc/stat` 第一行一致，不可调整。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuSample {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuSample {
    /// 空闲时间 = idle + iowait
    #[inline]
    pub fn idle_time(&self) -> u64 {
        self.idle + self.iowait
    }

    /// 非空闲时间，沿用协议定义：包含 idle 与 iowait；
    /// guest 与 guest_nice 已计入 user/nice，不重复累加
    #[inline]
    pub fn non_idle_time(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    #[inline]
    pub fn total_time(&self) -> u64 {
        self.idle_time() + self.non_idle_time()
    }
}

/// 内存统计（单位：kB），取自 `/proc/meminfo` 前五行
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub buffered: u64,
    pub cached: u64,
}

impl MemorySample {
    /// 已用内存 = total - free - buffered - cached
    #[inline]
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free)
            .saturating_sub(self.buffered)
            .saturating_sub(self.cached)
    }
}

/// 系统资源获取错误类型
#[derive(Debug)]
pub enum StatsError {
    /// 统计文件不存在或无法读取
    SourceUnavailable(std::io::Error),
    /// 统计文件内容格式错误
    ParseError(String),
}

impl From<std::io::Error> for StatsError {
    #[inline]
    fn from(error: std::io::Error) -> Self {
        StatsError::SourceUnavailable(error)
    }
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::SourceUnavailable(e) => write!(f, "数据源不可用: {e}"),
            StatsError::ParseError(s) => write!(f, "解析错误: {s}"),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::SourceUnavailable(e) => Some(e),
            StatsError::ParseError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

/// 系统计数器来源
///
/// 每次调用都是一次独立的读取，实现者不得保存跨调用状态。
pub trait StatsSource: Send + Sync {
    fn read_cpu_counters(&self) -> Result<CpuSample>;
    fn read_memory_counters(&self) -> Result<MemorySample>;
}

/// 基于 procfs 的计数器读取
#[derive(Debug, Clone)]
pub struct ProcStats {
    stat_path: PathBuf,
    meminfo_path: PathBuf,
}

impl Default for ProcStats {
    #[inline]
    fn default() -> Self {
        Self::new(PROC_STAT_PATH, PROC_MEMINFO_PATH)
    }
}

impl ProcStats {
    pub fn new(stat_path: impl Into<PathBuf>, meminfo_path: impl Into<PathBuf>) -> Self {
        Self {
            stat_path: stat_path.into(),
            meminfo_path: meminfo_path.into(),
        }
    }
}

impl StatsSource for ProcStats {
    fn read_cpu_counters(&self) -> Result<CpuSample> {
        let mut reader = BufReader::new(File::open(&self.stat_path)?);

        // 只需要第一行的汇总数据
        let mut first_line = String::with_capacity(128);
        reader
            .read_line(&mut first_line)
            .map_err(|e| StatsError::ParseError(format!("读取 CPU 汇总行失败: {e}")))?;

        parse_cpu_sample(&first_line)
    }

    fn read_memory_counters(&self) -> Result<MemorySample> {
        let reader = BufReader::new(File::open(&self.meminfo_path)?);

        let mut lines = Vec::with_capacity(MEMINFO_LINE_COUNT);
        for line in reader.lines().take(MEMINFO_LINE_COUNT) {
            lines.push(line.map_err(|e| StatsError::ParseError(format!("读取内存信息失败: {e}")))?);
        }

        parse_memory_sample(&lines.join("\n"))
    }
}

/// 解析 `/proc/stat` 的汇总行
///
/// 要求以 `cpu` 标签开头，后随至少十个无符号整数；多余的列被忽略。
pub fn parse_cpu_sample(line: &str) -> Result<CpuSample> {
    let mut parts = line.split_whitespace();

    match parts.next() {
        Some(CPU_LINE_PREFIX) => {}
        Some(other) => {
            return Err(StatsError::ParseError(format!(
                "CPU 汇总行前缀错误: {other}"
            )));
        }
        None => return Err(StatsError::ParseError("CPU 汇总行为空".to_string())),
    }

    let mut fields = [0u64; CPU_FIELD_COUNT];
    for (i, slot) in fields.iter_mut().enumerate() {
        let token = parts.next().ok_or_else(|| {
            StatsError::ParseError(format!("CPU 计数器不足: 仅有 {i} 个"))
        })?;
        *slot = token
            .parse()
            .map_err(|_| StatsError::ParseError(format!("无效的 CPU 计数器: {token}")))?;
    }

    let [
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
        guest,
        guest_nice,
    ] = fields;

    Ok(CpuSample {
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
        guest,
        guest_nice,
    })
}

/// 解析 `/proc/meminfo` 的前五行
///
/// 每行形如 `MemTotal:  16318112 kB`，取第二列。行的顺序固定为
/// MemTotal、MemFree、MemAvailable、Buffers、Cached。
pub fn parse_memory_sample(content: &str) -> Result<MemorySample> {
    let mut values = [0u64; MEMINFO_LINE_COUNT];
    let mut lines = content.lines();

    for (i, slot) in values.iter_mut().enumerate() {
        let line = lines.next().ok_or_else(|| {
            StatsError::ParseError(format!("内存信息行数不足: 仅有 {i} 行"))
        })?;
        let value = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| StatsError::ParseError(format!("内存信息行缺少数值: {line}")))?;
        *slot = value
            .parse()
            .map_err(|_| StatsError::ParseError(format!("无效的内存数值: {value}")))?;
    }

    let [total, free, available, buffered, cached] = values;

    Ok(MemorySample {
        total,
        free,
        available,
        buffered,
        cached,
    })
}
