use crate::stats::{CpuSample, Result, StatsSource};
use std::sync::{Mutex, PoisonError};

/// 上一次 CPU 采样的时间统计，用于增量计算
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuSamplerState {
    pub idle_time: u64,
    pub non_idle_time: u64,
}

impl CpuSamplerState {
    #[inline]
    pub fn from_sample(sample: &CpuSample) -> Self {
        Self {
            idle_time: sample.idle_time(),
            non_idle_time: sample.non_idle_time(),
        }
    }

    #[inline]
    pub fn total_time(&self) -> u64 {
        self.idle_time + self.non_idle_time
    }

    /// 进程启动后尚未采样过
    #[inline]
    pub fn is_initial(&self) -> bool {
        self.idle_time == 0 && self.non_idle_time == 0
    }
}

/// 根据前后两次采样计算 CPU 使用率（整数百分比，0..=100）
///
/// 首次采样或时间增量为 0 时返回 0，不做除法。
pub fn usage_percent(prev: CpuSamplerState, current: CpuSamplerState) -> u8 {
    if prev.is_initial() {
        return 0;
    }

    let total_diff = current.total_time().saturating_sub(prev.total_time());
    let idle_diff = current.idle_time.saturating_sub(prev.idle_time);

    if total_diff == 0 {
        return 0;
    }

    let busy_diff = total_diff.saturating_sub(idle_diff);
    let usage = busy_diff as f64 / total_diff as f64 * 100.0;

    usage.round().clamp(0.0, 100.0) as u8
}

/// CPU 使用率采样器
///
/// 进程内只存在一个实例，以共享引用传给每个连接。读取计数器、
/// 计算增量和写回状态在同一把锁内完成，并发请求之间不会看到
/// 彼此写了一半的状态，状态也不会回退到更旧的采样。
#[derive(Debug, Default)]
pub struct CpuSampler {
    state: Mutex<CpuSamplerState>,
}

impl CpuSampler {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定的上一次采样创建采样器
    #[inline]
    pub fn with_state(state: CpuSamplerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// 当前保存的上一次采样
    pub fn state(&self) -> CpuSamplerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 采样一次并返回使用率；读取失败时状态保持不变
    pub fn sample_usage<S: StatsSource + ?Sized>(&self, source: &S) -> Result<u8> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let sample = source.read_cpu_counters()?;
        let current = CpuSamplerState::from_sample(&sample);
        let usage = usage_percent(*state, current);

        *state = current;
        Ok(usage)
    }

    /// 采样一次并格式化为 `NN%\n`
    pub fn sample_usage_percent<S: StatsSource + ?Sized>(&self, source: &S) -> Result<String> {
        let usage = self.sample_usage(source)?;
        Ok(format!("{usage}%\n"))
    }
}
