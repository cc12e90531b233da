use std::sync::{Arc, Mutex};

use crate::config::Props;
use crate::{ShardlineError, Value};

use super::KeyGenerateAlgorithm;

/// 2016-11-01T00:00:00Z.
pub const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_MAX: i64 = (1 << WORKER_ID_BITS) - 1;
const DEFAULT_MAX_TOLERATE_MILLIS: i64 = 10;

pub trait TimeService: Send + Sync {
    fn current_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
    fn current_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: i64,
}

/// 64-bit keys: 41 bits of milliseconds since [`SNOWFLAKE_EPOCH_MILLIS`],
/// 10 bits of worker id, 12 bits of per-millisecond sequence.
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    max_tolerate_millis: i64,
    clock: Arc<dyn TimeService>,
    state: Mutex<SnowflakeState>,
}

impl std::fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .field("max_tolerate_millis", &self.max_tolerate_millis)
            .finish_non_exhaustive()
    }
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64) -> Result<Self, ShardlineError> {
        Self::with_clock(worker_id, Arc::new(SystemTimeService))
    }

    pub fn with_clock(worker_id: i64, clock: Arc<dyn TimeService>) -> Result<Self, ShardlineError> {
        if !(0..=WORKER_ID_MAX).contains(&worker_id) {
            return Err(ShardlineError::configuration(format!(
                "snowflake worker-id must be within 0..={WORKER_ID_MAX}, got {worker_id}"
            )));
        }
        Ok(Self {
            worker_id,
            max_tolerate_millis: DEFAULT_MAX_TOLERATE_MILLIS,
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardlineError> {
        let mut generator = Self::new(props.get_i64("worker-id")?.unwrap_or(0))?;
        if let Some(tolerance) = props.get_i64("max-tolerate-time-difference-milliseconds")? {
            generator.max_tolerate_millis = tolerance.max(0);
        }
        Ok(generator)
    }

    /// Spins until the clock passes `last_millis`; a key never carries a
    /// millisecond the clock has not reached.
    fn wait_until_after(&self, last_millis: i64) -> i64 {
        let mut now = self.clock.current_millis();
        while now <= last_millis {
            std::hint::spin_loop();
            now = self.clock.current_millis();
        }
        now
    }
}

impl KeyGenerateAlgorithm for SnowflakeKeyGenerator {
    fn type_name(&self) -> &'static str {
        "SNOWFLAKE"
    }

    fn generate_key(&self) -> Result<Value, ShardlineError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ShardlineError::KeyGeneration("snowflake state lock poisoned".into()))?;
        let mut now = self.clock.current_millis();
        if now < state.last_millis {
            let drift = state.last_millis - now;
            if drift > self.max_tolerate_millis {
                return Err(ShardlineError::KeyGeneration(format!(
                    "clock moved backwards by {drift}ms, tolerance is {}ms",
                    self.max_tolerate_millis
                )));
            }
            now = state.last_millis;
        }
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until_after(state.last_millis);
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        let elapsed = now - SNOWFLAKE_EPOCH_MILLIS;
        if elapsed < 0 {
            return Err(ShardlineError::KeyGeneration(format!(
                "clock reads {now}ms, before the snowflake epoch"
            )));
        }
        Ok(Value::Integer(
            (elapsed << (WORKER_ID_BITS + SEQUENCE_BITS))
                | (self.worker_id << SEQUENCE_BITS)
                | state.sequence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{SnowflakeKeyGenerator, TimeService, SNOWFLAKE_EPOCH_MILLIS};
    use crate::keygen::KeyGenerateAlgorithm;
    use crate::ErrorCode;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    struct FixedClock(AtomicI64);

    impl TimeService for FixedClock {
        fn current_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn key(generator: &SnowflakeKeyGenerator) -> i64 {
        generator
            .generate_key()
            .expect("key")
            .as_i64()
            .expect("integer key")
    }

    #[test]
    fn packs_timestamp_worker_and_sequence() {
        let clock = Arc::new(FixedClock(AtomicI64::new(SNOWFLAKE_EPOCH_MILLIS + 5)));
        let generator = SnowflakeKeyGenerator::with_clock(3, clock).expect("generator");
        assert_eq!(key(&generator), (5 << 22) | (3 << 12));
        assert_eq!(key(&generator), (5 << 22) | (3 << 12) | 1);
    }

    /// Reads `before` for the first `switch_after` calls, `after` from then on.
    struct SteppingClock {
        reads: AtomicI64,
        switch_after: i64,
        before: i64,
        after: i64,
    }

    impl TimeService for SteppingClock {
        fn current_millis(&self) -> i64 {
            if self.reads.fetch_add(1, Ordering::SeqCst) < self.switch_after {
                self.before
            } else {
                self.after
            }
        }
    }

    #[test]
    fn keys_stay_monotonic_when_the_clock_stalls_or_drifts_back() {
        let clock = Arc::new(FixedClock(AtomicI64::new(SNOWFLAKE_EPOCH_MILLIS + 100)));
        let generator = SnowflakeKeyGenerator::with_clock(0, clock.clone()).expect("generator");
        let mut previous = key(&generator);
        for _ in 0..4000 {
            let next = key(&generator);
            assert!(next > previous);
            previous = next;
        }
        clock.0.store(SNOWFLAKE_EPOCH_MILLIS + 99, Ordering::SeqCst);
        assert!(key(&generator) > previous);
    }

    #[test]
    fn exhausted_sequences_wait_for_the_next_millisecond() {
        let clock = Arc::new(SteppingClock {
            reads: AtomicI64::new(0),
            switch_after: 4097,
            before: SNOWFLAKE_EPOCH_MILLIS + 7,
            after: SNOWFLAKE_EPOCH_MILLIS + 8,
        });
        let generator = SnowflakeKeyGenerator::with_clock(0, clock.clone()).expect("generator");
        let mut last = 0;
        for _ in 0..4096 {
            last = key(&generator);
        }
        assert_eq!(last, (7 << 22) | 4095);
        assert_eq!(key(&generator), 8 << 22);
        assert!(clock.reads.load(Ordering::SeqCst) > 4097);
    }

    #[test]
    fn large_backwards_drift_fails() {
        let clock = Arc::new(FixedClock(AtomicI64::new(SNOWFLAKE_EPOCH_MILLIS + 1000)));
        let generator = SnowflakeKeyGenerator::with_clock(0, clock.clone()).expect("generator");
        key(&generator);
        clock.0.store(SNOWFLAKE_EPOCH_MILLIS, Ordering::SeqCst);
        let error = generator.generate_key().expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::KeyGeneration);
    }

    #[test]
    fn rejects_out_of_range_worker_ids() {
        assert!(SnowflakeKeyGenerator::new(1024).is_err());
        assert!(SnowflakeKeyGenerator::new(-1).is_err());
    }
}
