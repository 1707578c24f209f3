// src/drivers/mod.rs
// 链路、帧解析与显示缓冲
pub mod buffer;
pub mod error;
pub mod frame;
pub mod port_lock;
pub mod reader;
pub mod serial;
pub mod simulated;
pub mod source;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::{SlidingWindowBuffer, WindowSnapshot, DEFAULT_WINDOW_SECONDS};
pub use error::{CommandError, LinkError, StoreError};
pub use frame::{FrameError, RawFrame};
pub use port_lock::PortLease;
pub use reader::{spawn_reader, AcquisitionLoop, LoopState, ReaderHandle, DEFAULT_CHANNEL_CAPACITY};
pub use serial::{available_ports, SerialBackend};
pub use simulated::SimulatedBackend;
pub use source::{DeviceLink, LinkBackend, ManualBackend, ScriptStep};
