use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread::sleep,
    time::{Duration, Instant, SystemTime},
};

use log::{debug, info, warn};

use crate::{
    bus::RegisterBus,
    mpu6050::Mpu6050,
    publish::{
        Header, Message, PublishError, Publisher, TemperatureMessage, IMU_TOPIC, TEMPERATURE_TOPIC,
    },
    units::{convert_temp, PhysicalSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Sampling,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub published: u64,
    // register read failed
    pub failed: u64,
    // tick fell due while a cycle was running
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next <= now
    }

    // returns how many more deadlines had already passed by now
    pub fn advance(&mut self, now: Instant) -> u64 {
        self.next += self.period;
        self.skip_until(now)
    }

    pub fn skip_until(&mut self, now: Instant) -> u64 {
        let mut skipped = 0;

        while self.next <= now {
            self.next += self.period;
            skipped += 1;
        }

        skipped
    }
}

// all register access goes through &mut self, one cycle in flight at most
pub struct Scheduler<B, P> {
    mpu: Mpu6050<B>,
    publisher: P,
    frame_id: String,
    sample_period: Duration,
    temperature_period: Option<Duration>,
    state: SchedulerState,
    stats: SchedulerStats,
}

impl<B: RegisterBus, P: Publisher> Scheduler<B, P> {
    pub fn new(mpu: Mpu6050<B>, publisher: P, frame_id: String, sample_period: Duration) -> Self {
        Self {
            mpu,
            publisher,
            frame_id,
            sample_period,
            temperature_period: None,
            state: SchedulerState::Idle,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_temperature(mut self, period: Option<Duration>) -> Self {
        self.temperature_period = period;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    // a bus failure drops the message, only a lost sink is an error
    pub fn sample_imu(&mut self) -> Result<(), PublishError> {
        self.state = SchedulerState::Sampling;

        let result = match self.mpu.read_raw_sample() {
            Ok(raw) => {
                let sample = PhysicalSample::from_raw(&raw, &self.frame_id, SystemTime::now());
                self.publish(IMU_TOPIC, Message::Imu(sample.into()))
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!("dropping imu sample ({} dropped so far): {}", self.stats.failed, err);
                Ok(())
            }
        };

        self.state = SchedulerState::Idle;
        result
    }

    pub fn sample_temperature(&mut self) -> Result<(), PublishError> {
        self.state = SchedulerState::Sampling;

        let result = match self.mpu.read_raw_temperature() {
            Ok(raw) => {
                let message = TemperatureMessage {
                    header: Header {
                        frame_id: self.frame_id.clone(),
                        stamp: SystemTime::now(),
                    },
                    temperature: convert_temp(raw),
                };
                self.publish(TEMPERATURE_TOPIC, Message::Temperature(message))
            }
            Err(err) => {
                self.stats.failed += 1;
                warn!("dropping temperature sample: {}", err);
                Ok(())
            }
        };

        self.state = SchedulerState::Idle;
        result
    }

    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<SchedulerStats, PublishError> {
        let start = Instant::now();
        let mut imu = Ticker::new(self.sample_period, start);
        let mut temperature = self.temperature_period.map(|period| Ticker::new(period, start));

        info!(
            "sampling 0x{:02x} every {:?} on {}{}",
            self.mpu.address(),
            self.sample_period,
            IMU_TOPIC,
            temperature
                .map(|t| format!(", temperature every {:?}", t.period))
                .unwrap_or_default()
        );

        while !shutdown.load(Ordering::Relaxed) {
            let deadline = match &temperature {
                Some(t) => imu.deadline().min(t.deadline()),
                None => imu.deadline(),
            };
            let now = Instant::now();
            if deadline > now {
                sleep(deadline - now);
            }

            // only deadlines already reached here are serviced, anything
            // falling due while these cycles run is dropped
            let now = Instant::now();
            let imu_due = imu.is_due(now);
            let temperature_due = temperature.map_or(false, |t| t.is_due(now));

            if imu_due {
                self.sample_imu()?;
            }
            if temperature_due {
                self.sample_temperature()?;
            }
            if !imu_due && !temperature_due {
                continue;
            }

            let end = Instant::now();
            let mut skipped = if imu_due {
                imu.advance(end)
            } else {
                imu.skip_until(end)
            };
            if let Some(t) = temperature.as_mut() {
                skipped += if temperature_due {
                    t.advance(end)
                } else {
                    t.skip_until(end)
                };
            }
            self.skip(skipped);
        }

        info!(
            "sampling stopped: {} published, {} failed, {} skipped",
            self.stats.published, self.stats.failed, self.stats.skipped
        );
        Ok(self.stats)
    }

    fn publish(&mut self, topic: &'static str, message: Message) -> Result<(), PublishError> {
        self.publisher.publish(topic, message)?;
        self.stats.published += 1;
        Ok(())
    }

    fn skip(&mut self, ticks: u64) {
        if ticks > 0 {
            self.stats.skipped += ticks;
            debug!("cycle overran, skipped {} tick(s)", ticks);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        rc::Rc,
        sync::{
            atomic::AtomicBool,
            mpsc::{channel, Receiver, Sender},
            Arc,
        },
    };

    use super::*;
    use crate::{
        mpu6050::testing::{Event, FakeBus},
        publish::Published,
    };

    const EPSILON: f64 = 1e-9;

    fn scheduler(bus: FakeBus) -> (Scheduler<FakeBus, Sender<Published>>, Receiver<Published>) {
        let (tx, rx) = channel();
        let mpu = Mpu6050::new(bus, 0x68);
        (
            Scheduler::new(mpu, tx, "imu".into(), Duration::from_millis(20)),
            rx,
        )
    }

    #[test]
    fn published_message_carries_converted_values() {
        let bus = FakeBus::default()
            .with_word(0x3B, 0x0800)
            .with_word(0x3F, 0xF000)
            .with_word(0x45, 0x00A4);
        let (mut scheduler, rx) = scheduler(bus);

        scheduler.sample_imu().unwrap();

        let published = rx.try_recv().unwrap();
        assert_eq!(published.topic, "imu/data_raw");
        let imu = match published.message {
            Message::Imu(imu) => imu,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(imu.header.frame_id, "imu");
        assert!((imu.linear_acceleration.x - 9.8).abs() < EPSILON);
        assert_eq!(imu.linear_acceleration.y, 0.0);
        assert!((imu.linear_acceleration.z + 19.6).abs() < EPSILON);
        assert!((imu.angular_velocity.y - 0.174).abs() < EPSILON);
        assert_eq!(scheduler.stats().published, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn failed_read_publishes_nothing_and_keeps_running() {
        for register in [0x3B, 0x3E, 0x40, 0x43, 0x46, 0x48] {
            let bus = FakeBus::default().failing_on(register);
            let failing = Rc::clone(&bus.failing);
            let (mut scheduler, rx) = scheduler(bus);

            scheduler.sample_imu().unwrap();
            assert!(rx.try_recv().is_err(), "register 0x{:02x}", register);
            assert_eq!(scheduler.state(), SchedulerState::Idle);
            assert_eq!(scheduler.stats().failed, 1);

            failing.borrow_mut().clear();
            scheduler.sample_imu().unwrap();
            assert!(rx.try_recv().is_ok());
            assert_eq!(scheduler.stats().published, 1);
        }
    }

    #[test]
    fn cycle_reads_only_output_registers() {
        let bus = FakeBus::default();
        let log = Rc::clone(&bus.log);
        let (mut scheduler, _rx) = scheduler(bus);

        scheduler.sample_imu().unwrap();

        let registers: Vec<u8> = log
            .borrow()
            .iter()
            .map(|event| match event {
                Event::Read { address, register } => {
                    assert_eq!(*address, 0x68);
                    *register
                }
                other => panic!("unexpected bus event: {:?}", other),
            })
            .collect();
        assert_eq!(
            registers,
            vec![0x3B, 0x3C, 0x3D, 0x3E, 0x3F, 0x40, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48]
        );
    }

    #[test]
    fn temperature_topic() {
        let bus = FakeBus::default().with_word(0x41, 0x0154);
        let (mut scheduler, rx) = scheduler(bus);

        scheduler.sample_temperature().unwrap();

        let published = rx.try_recv().unwrap();
        assert_eq!(published.topic, "temperature");
        match published.message {
            Message::Temperature(temp) => assert!((temp.temperature - 37.53).abs() < EPSILON),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn lost_sink_is_reported() {
        let (mut scheduler, rx) = scheduler(FakeBus::default());
        drop(rx);

        assert!(scheduler.sample_imu().is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn ticker_drops_overlapping_ticks() {
        let start = Instant::now();
        let period = Duration::from_millis(20);
        let mut ticker = Ticker::new(period, start);

        assert!(!ticker.is_due(start));
        assert!(ticker.is_due(start + period));

        // serviced on time
        assert_eq!(ticker.advance(start + Duration::from_millis(25)), 0);
        assert_eq!(ticker.deadline(), start + Duration::from_millis(40));

        // cycle ran until 95ms: 60 and 80 were missed
        assert_eq!(ticker.advance(start + Duration::from_millis(95)), 2);
        assert_eq!(ticker.deadline(), start + Duration::from_millis(100));

        // another topic's cycle ran from 90ms to 125ms
        assert_eq!(ticker.skip_until(start + Duration::from_millis(125)), 2);
        assert_eq!(ticker.deadline(), start + Duration::from_millis(140));
        assert_eq!(ticker.skip_until(start + Duration::from_millis(130)), 0);
    }

    struct StopAfter {
        remaining: usize,
        shutdown: Arc<AtomicBool>,
        received: Vec<Published>,
    }

    impl Publisher for StopAfter {
        fn publish(&mut self, topic: &'static str, message: Message) -> Result<(), PublishError> {
            self.received.push(Published { topic, message });
            self.remaining -= 1;
            if self.remaining == 0 {
                self.shutdown.store(true, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn run_samples_until_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let publisher = StopAfter {
            remaining: 3,
            shutdown: Arc::clone(&shutdown),
            received: Vec::new(),
        };
        let mpu = Mpu6050::new(FakeBus::default().with_word(0x3B, 0x0800), 0x68);
        let mut scheduler = Scheduler::new(mpu, publisher, "imu".into(), Duration::from_millis(1));

        let stats = scheduler.run(&shutdown).unwrap();

        assert_eq!(stats.published, 3);
        assert_eq!(stats.failed, 0);
        assert!(scheduler
            .publisher
            .received
            .iter()
            .all(|published| published.topic == IMU_TOPIC));
    }

    struct Timed {
        remaining: usize,
        shutdown: Arc<AtomicBool>,
        received: Vec<(&'static str, Instant)>,
    }

    impl Publisher for Timed {
        fn publish(&mut self, topic: &'static str, _message: Message) -> Result<(), PublishError> {
            self.received.push((topic, Instant::now()));
            self.remaining -= 1;
            if self.remaining == 0 {
                self.shutdown.store(true, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn imu_tick_during_slow_temperature_cycle_is_dropped() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let publisher = Timed {
            remaining: 6,
            shutdown: Arc::clone(&shutdown),
            received: Vec::new(),
        };
        let bus = FakeBus::default().slow_on(0x41, Duration::from_millis(25));
        let mpu = Mpu6050::new(bus, 0x68);
        let period = Duration::from_millis(10);
        let mut scheduler =
            Scheduler::new(mpu, publisher, "imu".into(), period).with_temperature(Some(period));

        let stats = scheduler.run(&shutdown).unwrap();

        let imu: Vec<Instant> = scheduler
            .publisher
            .received
            .iter()
            .filter(|(topic, _)| *topic == IMU_TOPIC)
            .map(|(_, at)| *at)
            .collect();
        assert!(imu.len() >= 2);
        // every imu cycle is followed by a 25ms temperature read, so no two
        // imu messages can be closer than that unless a late tick was run
        for pair in imu.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(20),
                "imu ticks {:?} apart",
                pair[1] - pair[0]
            );
        }
        assert!(stats.skipped >= 2);
    }

    #[test]
    fn run_stops_when_sink_disconnects() {
        let shutdown = AtomicBool::new(false);
        let (mut scheduler, rx) = scheduler(FakeBus::default());
        let mut scheduler = {
            scheduler.sample_period = Duration::from_millis(1);
            scheduler.with_temperature(Some(Duration::from_millis(2)))
        };
        drop(rx);

        assert!(matches!(
            scheduler.run(&shutdown),
            Err(PublishError::Disconnected(_))
        ));
    }
}
