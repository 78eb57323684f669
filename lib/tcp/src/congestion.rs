//! Congestion control variants: AIMD, Reno, and CUBIC.
//!
//! All three windows are tracked in bytes but reasoned about in units of [`MSS`] (the real
//! implementation this crate's behavior is modeled on windows its initial congestion window in
//! packets, not bytes, so we convert at the boundary).

/// Maximum segment size assumed for all cwnd/ssthresh arithmetic.
pub const MSS: u32 = 1400;

/// Minimum congestion window, in segments. Never let cwnd collapse below this even after a
/// timeout, so a connection can always make forward progress.
pub const MIN_CWND_SEGMENTS: u32 = 10;

/// Initial congestion window, in segments, before any ack/loss feedback has arrived.
pub const INITIAL_CWND_SEGMENTS: u32 = 10;

fn segments_to_bytes(segments: u32) -> u32 {
    segments.saturating_mul(MSS)
}

/// The contract every congestion-control variant implements: react to acks, losses, and
/// timeouts, and report the current window and slow-start threshold.
pub trait CongestionControl: std::fmt::Debug {
    /// An ack covering `bytes_acked` new bytes arrived, with a round-trip-time sample of
    /// `rtt_ns` nanoseconds (0 if this ack didn't produce a usable RTT sample, e.g. it acked a
    /// retransmitted segment).
    fn on_ack(&mut self, bytes_acked: u32, rtt_ns: u64);

    /// Fast retransmit was triggered (three duplicate acks).
    fn on_loss(&mut self);

    /// A retransmission timeout fired.
    fn on_timeout(&mut self);

    /// The current congestion window, in bytes.
    fn cwnd(&self) -> u32;

    /// The current slow-start threshold, in bytes.
    fn ssthresh(&self) -> u32;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CongestionControlKind {
    Aimd,
    Reno,
    Cubic,
}

impl CongestionControlKind {
    pub fn new_state(self) -> Box<dyn CongestionControl + Send> {
        match self {
            CongestionControlKind::Aimd => Box::new(AimdState::new()),
            CongestionControlKind::Reno => Box::new(RenoState::new()),
            CongestionControlKind::Cubic => Box::new(CubicState::new()),
        }
    }
}

/// Plain additive-increase/multiplicative-decrease: no slow start, cwnd grows by one segment per
/// RTT-worth of acked bytes and halves on loss.
#[derive(Debug)]
pub struct AimdState {
    cwnd: u32,
    ssthresh: u32,
}

impl AimdState {
    pub fn new() -> Self {
        Self {
            cwnd: segments_to_bytes(INITIAL_CWND_SEGMENTS),
            ssthresh: u32::MAX,
        }
    }

    fn min_cwnd() -> u32 {
        segments_to_bytes(MIN_CWND_SEGMENTS)
    }
}

impl Default for AimdState {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionControl for AimdState {
    fn on_ack(&mut self, bytes_acked: u32, _rtt_ns: u64) {
        // additive increase: one MSS worth of growth per window's worth of acked bytes.
        let increase = (MSS as u64 * bytes_acked as u64) / self.cwnd.max(1) as u64;
        self.cwnd = self.cwnd.saturating_add(increase as u32);
    }

    fn on_loss(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(Self::min_cwnd());
        self.cwnd = self.ssthresh;
    }

    fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(Self::min_cwnd());
        self.cwnd = segments_to_bytes(MIN_CWND_SEGMENTS);
    }

    fn cwnd(&self) -> u32 {
        self.cwnd
    }

    fn ssthresh(&self) -> u32 {
        self.ssthresh
    }
}

/// Standard Reno: slow start until `cwnd >= ssthresh`, then congestion avoidance (AIMD); fast
/// retransmit halves the window and enters fast recovery; RTO resets to the minimum window.
#[derive(Debug)]
pub struct RenoState {
    cwnd: u32,
    ssthresh: u32,
}

impl RenoState {
    pub fn new() -> Self {
        Self {
            cwnd: segments_to_bytes(INITIAL_CWND_SEGMENTS),
            ssthresh: u32::MAX,
        }
    }

    fn min_cwnd() -> u32 {
        segments_to_bytes(MIN_CWND_SEGMENTS)
    }

    fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }
}

impl Default for RenoState {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionControl for RenoState {
    fn on_ack(&mut self, bytes_acked: u32, _rtt_ns: u64) {
        if self.in_slow_start() {
            // slow start: cwnd grows by one MSS per acked segment, i.e. roughly doubles per RTT.
            self.cwnd = self.cwnd.saturating_add(bytes_acked.min(MSS));
        } else {
            // congestion avoidance: grow by one MSS per window's worth of acked bytes.
            let increase = (MSS as u64 * bytes_acked as u64) / self.cwnd.max(1) as u64;
            self.cwnd = self.cwnd.saturating_add(increase as u32);
        }
    }

    fn on_loss(&mut self) {
        // fast retransmit: halve the window, then inflate by the 3 segments known to have left
        // the network (fast recovery).
        self.ssthresh = (self.cwnd / 2).max(Self::min_cwnd());
        self.cwnd = self.ssthresh + 3 * MSS;
    }

    fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(Self::min_cwnd());
        self.cwnd = segments_to_bytes(MIN_CWND_SEGMENTS);
    }

    fn cwnd(&self) -> u32 {
        self.cwnd
    }

    fn ssthresh(&self) -> u32 {
        self.ssthresh
    }
}

/// CUBIC (RFC 8312): cwnd follows a cubic function of the time since the last loss event,
/// independent of RTT, converging on `w_max` (the window size at last loss) from below.
#[derive(Debug)]
pub struct CubicState {
    cwnd: u32,
    ssthresh: u32,
    /// Window size (bytes) at the last congestion event.
    w_max: u32,
    /// Time, in seconds since the last congestion event, at which cwnd is predicted to reach
    /// `w_max` again.
    k: f64,
    /// Seconds elapsed since the last congestion event, accumulated from per-ack RTT samples.
    t: f64,
    origin_point: u32,
}

const CUBIC_C: f64 = 0.4;
const CUBIC_BETA: f64 = 0.7;

impl CubicState {
    pub fn new() -> Self {
        Self {
            cwnd: segments_to_bytes(INITIAL_CWND_SEGMENTS),
            ssthresh: u32::MAX,
            w_max: segments_to_bytes(INITIAL_CWND_SEGMENTS),
            k: 0.0,
            t: 0.0,
            origin_point: segments_to_bytes(INITIAL_CWND_SEGMENTS),
        }
    }

    fn min_cwnd() -> u32 {
        segments_to_bytes(MIN_CWND_SEGMENTS)
    }

    fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    fn recompute_k(&mut self) {
        let w_max = self.w_max as f64 / MSS as f64;
        let cwnd = self.cwnd as f64 / MSS as f64;
        let diff = ((w_max - cwnd).max(0.0)) / CUBIC_C;
        self.k = diff.cbrt();
        self.t = 0.0;
        self.origin_point = self.w_max;
    }
}

impl Default for CubicState {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionControl for CubicState {
    fn on_ack(&mut self, bytes_acked: u32, rtt_ns: u64) {
        if self.in_slow_start() {
            self.cwnd = self.cwnd.saturating_add(bytes_acked.min(MSS));
            return;
        }

        let rtt_secs = (rtt_ns as f64) / 1e9;
        self.t += rtt_secs.max(0.0);

        let target_segments =
            CUBIC_C * (self.t - self.k).powi(3) + (self.origin_point as f64 / MSS as f64);
        let target_bytes = (target_segments * MSS as f64).max(Self::min_cwnd() as f64);

        self.cwnd = if target_bytes > self.cwnd as f64 {
            // climb no faster than one MSS per RTT, matching the RFC's concave/convex region cap.
            self.cwnd.saturating_add(
                (((target_bytes - self.cwnd as f64) / self.cwnd.max(1) as f64) * MSS as f64) as u32,
            )
        } else {
            target_bytes as u32
        };
    }

    fn on_loss(&mut self) {
        self.w_max = self.cwnd;
        self.ssthresh = ((self.cwnd as f64 * CUBIC_BETA) as u32).max(Self::min_cwnd());
        self.cwnd = self.ssthresh;
        self.recompute_k();
    }

    fn on_timeout(&mut self) {
        self.w_max = self.cwnd;
        self.ssthresh = ((self.cwnd as f64 * CUBIC_BETA) as u32).max(Self::min_cwnd());
        self.cwnd = segments_to_bytes(MIN_CWND_SEGMENTS);
        self.recompute_k();
    }

    fn cwnd(&self) -> u32 {
        self.cwnd
    }

    fn ssthresh(&self) -> u32 {
        self.ssthresh
    }
}
