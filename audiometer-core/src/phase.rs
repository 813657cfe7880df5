/// Defines test phases and behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    /// Listener responses are only collected while this holds.
    fn allows_input(&self) -> bool;
    fn next(&self) -> Option<Self>;
}

#[derive(Copy, Debug, Clone, PartialEq, Default)]
pub enum StandardPhase {
    #[default]
    Welcome,
    /// Opening chime, also used to measure playback latency.
    Greeting,
    Countdown,
    Sweep,
    /// Closing chime.
    Farewell,
    Debrief,
}

impl Phase for StandardPhase {
    fn allows_input(&self) -> bool {
        matches!(self, Self::Sweep)
    }
    fn next(&self) -> Option<Self> {
        use StandardPhase::*;
        Some(match self {
            Welcome => Greeting,
            Greeting => Countdown,
            Countdown => Sweep,
            Sweep => Farewell,
            Farewell => Debrief,
            Debrief => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_run_in_order_and_end() {
        let mut phase = StandardPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                StandardPhase::Welcome,
                StandardPhase::Greeting,
                StandardPhase::Countdown,
                StandardPhase::Sweep,
                StandardPhase::Farewell,
                StandardPhase::Debrief,
            ]
        );
    }

    #[test]
    fn test_only_sweep_accepts_input() {
        let mut phase = StandardPhase::Welcome;
        loop {
            assert_eq!(phase.allows_input(), phase == StandardPhase::Sweep);
            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }
    }
}
