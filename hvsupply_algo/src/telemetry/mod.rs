// Telemetry link between the high side (sender) and the low side (receiver).
//
// One frame per acquisition carries the extract and focus voltages measured on the
// high side. There is no acknowledgment or retransmission; loss is only detected by
// the liveness watchdog on the low side.

pub mod frame;
pub mod receiver;
pub mod sender;
pub mod watchdog;

pub use frame::{CommFrame, LinkError, FRAME_LEN, PAYLOAD_LEN};
pub use receiver::{recovery, restart_pending, LineErrors, LinkReceiver, LinkStats, Recovery, RX_CAPACITY};
pub use sender::{FrameTransmit, SendOutcome, SenderStats, TelemetrySender};
pub use watchdog::{LinkWatchdog, COMM_WATCHDOG_TICKS};

/// Link baud rate, both sides.
pub const LINK_BAUD: u32 = 115_200;
