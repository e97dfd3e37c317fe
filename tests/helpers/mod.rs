/// Test doubles simulating the radio, the channel store and time during
/// integration tests.
use espnow_link::core::MacAddress;
use espnow_link::protocol::link::event_pump::RxLane;
use espnow_link::protocol::transport::traits::{
    channel_store::ChannelStore, clock::Clock, link_timer::LinkTimer, radio_driver::RadioDriver,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::time::{sleep, Duration, Instant};

#[allow(dead_code)]
pub const MAC_A: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
#[allow(dead_code)]
pub const MAC_B: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x02]);

//==================================================================================Radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum MockRadioError {
    QueueFull,
    PeerTableFull,
    ChannelRefused,
}

#[derive(Default)]
struct RadioState {
    channel: u8,
    fail_submit: bool,
    fail_add_peer: bool,
    fail_set_channel: bool,
    set_channel_delay_ms: u64,
    set_channel_calls: u32,
    sent: Vec<(MacAddress, Vec<u8>)>,
    peers: Vec<(MacAddress, u8)>,
}

/// In-memory radio recording every call. Attached to an [`Air`], submitted
/// frames reach the other stations tuned to the same channel.
#[allow(dead_code)]
pub struct MockRadio {
    mac: MacAddress,
    state: Mutex<RadioState>,
    air: OnceLock<&'static Air>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new(mac: MacAddress, channel: u8) -> Self {
        Self {
            mac,
            state: Mutex::new(RadioState {
                channel,
                ..RadioState::default()
            }),
            air: OnceLock::new(),
        }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn set_fail_submit(&self, fail: bool) {
        self.state.lock().unwrap().fail_submit = fail;
    }

    pub fn set_fail_add_peer(&self, fail: bool) {
        self.state.lock().unwrap().fail_add_peer = fail;
    }

    pub fn set_fail_set_channel(&self, fail: bool) {
        self.state.lock().unwrap().fail_set_channel = fail;
    }

    /// Make `set_channel` block the calling thread, as a slow driver would.
    pub fn set_channel_delay_ms(&self, millis: u64) {
        self.state.lock().unwrap().set_channel_delay_ms = millis;
    }

    pub fn sent(&self) -> Vec<(MacAddress, Vec<u8>)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn peers(&self) -> Vec<(MacAddress, u8)> {
        self.state.lock().unwrap().peers.clone()
    }

    pub fn set_channel_calls(&self) -> u32 {
        self.state.lock().unwrap().set_channel_calls
    }
}

impl RadioDriver for MockRadio {
    type Error = MockRadioError;

    fn submit(&self, mac: &MacAddress, frame: &[u8]) -> Result<(), Self::Error> {
        let channel = {
            let mut state = self.state.lock().unwrap();
            if state.fail_submit {
                return Err(MockRadioError::QueueFull);
            }
            state.sent.push((*mac, frame.to_vec()));
            state.channel
        };
        if let Some(air) = self.air.get() {
            air.deliver(self.mac, *mac, channel, frame);
        }
        Ok(())
    }

    fn set_channel(&self, channel: u8) -> Result<(), Self::Error> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.set_channel_calls += 1;
            if state.fail_set_channel {
                return Err(MockRadioError::ChannelRefused);
            }
            state.channel = channel;
            state.set_channel_delay_ms
        };
        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay));
        }
        Ok(())
    }

    fn channel(&self) -> u8 {
        self.state.lock().unwrap().channel
    }

    fn add_peer(&self, mac: &MacAddress, channel: u8) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add_peer {
            return Err(MockRadioError::PeerTableFull);
        }
        if !state.peers.iter().any(|(known, _)| known == mac) {
            state.peers.push((*mac, channel));
        }
        Ok(())
    }
}

/// Shared medium linking mock radios to their receive lanes.
#[allow(dead_code)]
#[derive(Default)]
pub struct Air {
    stations: Mutex<Vec<(&'static MockRadio, &'static RxLane)>>,
}

#[allow(dead_code)]
impl Air {
    pub fn attach(&'static self, radio: &'static MockRadio, rx: &'static RxLane) {
        let _ = radio.air.set(self);
        self.stations.lock().unwrap().push((radio, rx));
    }

    fn deliver(&self, from: MacAddress, to: MacAddress, channel: u8, frame: &[u8]) {
        let stations = self.stations.lock().unwrap().clone();
        for (radio, rx) in stations {
            let addressed = to == MacAddress::BROADCAST || to == radio.mac;
            if radio.mac != from && addressed && radio.channel() == channel {
                rx.push_from_isr(from, frame, 0);
            }
        }
    }
}

/// Give a test value a `'static` lifetime.
#[allow(dead_code)]
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

//==================================================================================Store
/// Channel store kept in memory; can be told to fail.
#[derive(Default)]
#[allow(dead_code)]
pub struct MockStore {
    channel: Mutex<Option<u8>>,
    failing: Mutex<bool>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn with_channel(channel: u8) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            failing: Mutex::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            channel: Mutex::new(None),
            failing: Mutex::new(true),
        }
    }

    pub fn stored(&self) -> Option<u8> {
        *self.channel.lock().unwrap()
    }
}

impl ChannelStore for MockStore {
    type Error = &'static str;

    fn load_channel(&self) -> Result<Option<u8>, Self::Error> {
        if *self.failing.lock().unwrap() {
            return Err("nvs unavailable");
        }
        Ok(*self.channel.lock().unwrap())
    }

    fn save_channel(&self, channel: u8) -> Result<(), Self::Error> {
        if *self.failing.lock().unwrap() {
            return Err("nvs unavailable");
        }
        *self.channel.lock().unwrap() = Some(channel);
        Ok(())
    }
}

//==================================================================================Time
/// Virtual clock: `now_ms` only moves when the test says so. Bounded waits
/// still elapse in real time.
#[derive(Default)]
#[allow(dead_code)]
pub struct ManualClock {
    now: AtomicU64,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

/// Real-time clock on top of the tokio timer.
#[allow(dead_code)]
pub struct TokioClock {
    origin: Instant,
}

#[allow(dead_code)]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep_ms(&self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive delays in tests.
pub struct MockTimer;

impl LinkTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}
