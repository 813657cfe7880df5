use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trait for high-precision timers
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    /// Records how long a blocking playback took against its nominal length.
    fn record_playback(&mut self, nominal: Duration, actual: Duration);
    fn playback_stats(&self) -> PlaybackStats;
}

/// Overrun statistics of blocking audio writes, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    pub samples: usize,
    pub average_overrun_ns: f64,
    pub jitter_ns: f64,
    pub min_overrun_ns: f64,
    pub max_overrun_ns: f64,
}

impl PlaybackStats {
    /// Extra time to keep a response window open: three standard deviations of overrun.
    pub fn safe_margin(&self) -> Duration {
        Duration::from_nanos((self.jitter_ns * 3.0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub overruns: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        self.high_precision_sleep(d)
    }
    fn record_playback(&mut self, nominal: Duration, actual: Duration) {
        if self.overruns.len() >= self.max_samples {
            self.overruns.pop_front();
        }
        self.overruns.push_back(actual.saturating_sub(nominal));
    }
    fn playback_stats(&self) -> PlaybackStats {
        if self.overruns.is_empty() {
            return PlaybackStats::default();
        }
        let times: Vec<f64> = self
            .overruns
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        PlaybackStats {
            samples: times.len(),
            average_overrun_ns: avg,
            jitter_ns: var.sqrt(),
            min_overrun_ns: times.iter().copied().fold(f64::INFINITY, f64::min),
            max_overrun_ns: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            overruns: VecDeque::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject, INFINITE,
        };

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, None) else {
                std::thread::sleep(duration);
                return;
            };

            // Negative due time is relative, in 100 ns intervals.
            let due_time = -((duration.as_nanos() / 100) as i64);

            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }

            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // Resume with the remainder when a signal interrupts the sleep.
        while unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) } == EINTR {
            req = rem;
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_epoch() {
        let timer = HighPrecisionTimer::new();
        let clone = timer.clone();
        let a = timer.now();
        let b = clone.now();
        assert!(b >= a);
    }

    #[test]
    fn test_sleep_waits_at_least_requested() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(5));
        assert!(timer.elapsed(before) >= Duration::from_millis(5));
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let timer = HighPrecisionTimer::new();
        let stats = timer.playback_stats();
        assert_eq!(stats, PlaybackStats::default());
        assert_eq!(stats.safe_margin(), Duration::ZERO);
    }

    #[test]
    fn test_playback_stats_measure_overrun() {
        let mut timer = HighPrecisionTimer::new();
        let nominal = Duration::from_millis(200);
        timer.record_playback(nominal, Duration::from_millis(210));
        timer.record_playback(nominal, Duration::from_millis(230));
        // Early completion counts as zero overrun.
        timer.record_playback(nominal, Duration::from_millis(190));

        let stats = timer.playback_stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.min_overrun_ns, 0.0);
        assert_eq!(stats.max_overrun_ns, 30_000_000.0);
        assert!((stats.average_overrun_ns - 40_000_000.0 / 3.0).abs() < 1.0);
        assert!(stats.jitter_ns > 0.0);
        assert_eq!(
            stats.safe_margin(),
            Duration::from_nanos((stats.jitter_ns * 3.0) as u64)
        );
    }

    #[test]
    fn test_overrun_history_is_bounded() {
        let mut timer = HighPrecisionTimer::new();
        timer.max_samples = 4;
        for ms in 0..10 {
            timer.record_playback(Duration::ZERO, Duration::from_millis(ms));
        }
        assert_eq!(timer.overruns.len(), 4);
        assert_eq!(timer.playback_stats().min_overrun_ns, 6_000_000.0);
    }
}
