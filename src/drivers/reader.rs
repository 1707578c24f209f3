// src/drivers/reader.rs
// 后台读取线程 + 启停状态机
// 读取线程独占 DeviceLink 和 PortLease；坏行直接丢弃；链路故障只发一条 Error，然后线程退出，不重试

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use log::{debug, info, warn};

use crate::drivers::port_lock::PortLease;
use crate::drivers::source::{DeviceLink, LinkBackend};
use crate::drivers::{LinkError, RawFrame};
use crate::types::{ChannelMessage, LinkSettings};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Handle to a running reader thread.
pub struct ReaderHandle {
    port: String,
    stop: Arc<AtomicBool>,
    rx: Receiver<ChannelMessage>,
    thread: Option<JoinHandle<()>>,
}

/// Claims the port, opens the link and spawns the reader thread.
///
/// Both `PortBusy` and open failures are returned here, before any thread exists.
pub fn spawn_reader(
    backend: Arc<dyn LinkBackend>,
    settings: LinkSettings,
    capacity: usize,
) -> Result<ReaderHandle, LinkError> {
    let lease = PortLease::acquire(&settings.port)?;
    let link = backend.open(&settings)?;
    info!("reading {} at {} baud", settings.port, settings.baud);
    let (tx, rx) = bounded(capacity.max(1));
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let port = settings.port.clone();
    let thread = thread::Builder::new()
        .name(format!("link-reader-{port}"))
        .spawn(move || {
            let _lease = lease;
            run_reader(link, &settings, &tx, &stop_flag);
        })
        .map_err(|e| LinkError::unavailable(&port, e))?;
    Ok(ReaderHandle {
        port,
        stop,
        rx,
        thread: Some(thread),
    })
}

fn run_reader(
    mut link: Box<dyn DeviceLink>,
    settings: &LinkSettings,
    tx: &Sender<ChannelMessage>,
    stop: &AtomicBool,
) {
    let patience = settings.read_timeout;
    let mut dropped = 0usize;
    while !stop.load(Ordering::Acquire) {
        match link.read_line() {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match RawFrame::parse(&line) {
                    Ok(frame) => {
                        let msg = ChannelMessage::Data {
                            flow: frame.flow,
                            volume: frame.volume,
                        };
                        if !deliver(tx, msg, stop, patience) {
                            break;
                        }
                    }
                    Err(reason) => {
                        dropped += 1;
                        debug!("dropped frame {:?}: {reason}", line.trim());
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{e}");
                deliver(tx, ChannelMessage::Error(e.to_string()), stop, patience);
                return;
            }
        }
    }
    info!(
        "reader on {} stopped ({dropped} malformed frames dropped)",
        settings.port
    );
}

// 通道满时阻塞（背压），每隔 patience 检查一次停止标志
fn deliver(
    tx: &Sender<ChannelMessage>,
    mut msg: ChannelMessage,
    stop: &AtomicBool,
    patience: Duration,
) -> bool {
    loop {
        match tx.send_timeout(msg, patience) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                msg = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

impl ReaderHandle {
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Non-blocking take; never waits on the reader.
    pub fn try_take(&self) -> Option<ChannelMessage> {
        self.rx.try_recv().ok()
    }

    /// Signals the thread, waits for it to release the link and returns
    /// everything it queued but nobody took yet. Calling it again returns nothing.
    pub fn stop(&mut self) -> Vec<ChannelMessage> {
        self.stop.store(true, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Vec::new();
        };
        // 一直收到发送端随线程退出而断开，读取线程不会卡在满通道上
        let leftovers: Vec<ChannelMessage> = self.rx.iter().collect();
        if thread.join().is_err() {
            warn!("reader thread on {} panicked", self.port);
        }
        leftovers
    }

    pub fn is_stopped(&self) -> bool {
        self.thread.is_none()
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Observable state of an [`AcquisitionLoop`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Failed(String),
}

enum Slot {
    Idle,
    Running(ReaderHandle),
    Failed(String),
}

/// Start/stop state machine for one acquisition loop.
///
/// `Idle -> Running` on start, `Idle -> Failed` when the port cannot be opened,
/// `Running -> Idle` on stop, `Running -> Failed` when the reader reports an
/// error. `Failed` stays put until the next `start`.
pub struct AcquisitionLoop {
    backend: Arc<dyn LinkBackend>,
    settings: LinkSettings,
    capacity: usize,
    slot: Slot,
    // 停止或打开失败后还没被 poll 取走的消息
    pending: VecDeque<ChannelMessage>,
}

impl AcquisitionLoop {
    pub fn new(backend: Arc<dyn LinkBackend>, settings: LinkSettings, capacity: usize) -> Self {
        Self {
            backend,
            settings,
            capacity,
            slot: Slot::Idle,
            pending: VecDeque::new(),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn state(&self) -> LoopState {
        match &self.slot {
            Slot::Idle => LoopState::Idle,
            Slot::Running(_) => LoopState::Running,
            Slot::Failed(reason) => LoopState::Failed(reason.clone()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.slot, Slot::Running(_))
    }

    /// Stops any current reader, then spawns a fresh one.
    ///
    /// `PortBusy` is returned as an error. An open failure is not: the loop
    /// moves to `Failed` and the next `poll` yields the single `Error`.
    /// Messages left over from the previous run are discarded on success.
    pub fn start(&mut self) -> Result<(), LinkError> {
        self.stop();
        match spawn_reader(
            Arc::clone(&self.backend),
            self.settings.clone(),
            self.capacity,
        ) {
            Ok(handle) => {
                self.pending.clear();
                self.slot = Slot::Running(handle);
                Ok(())
            }
            Err(e @ LinkError::PortBusy { .. }) => Err(e),
            Err(e) => {
                warn!("{e}");
                let reason = e.to_string();
                self.pending.clear();
                self.pending.push_back(ChannelMessage::Error(reason.clone()));
                self.slot = Slot::Failed(reason);
                Ok(())
            }
        }
    }

    /// Graceful stop. No-op when idle or failed.
    ///
    /// Readings the thread queued before it stopped stay available to the next
    /// `poll`. If one of them is the reader's `Error`, the loop ends `Failed`.
    pub fn stop(&mut self) {
        let Slot::Running(handle) = &mut self.slot else {
            return;
        };
        let leftovers = handle.stop();
        let failure = leftovers.iter().find_map(|m| match m {
            ChannelMessage::Error(reason) => Some(reason.clone()),
            ChannelMessage::Data { .. } => None,
        });
        self.pending.extend(leftovers);
        self.slot = match failure {
            Some(reason) => Slot::Failed(reason),
            None => Slot::Idle,
        };
    }

    /// Drains whatever is queued, without blocking.
    ///
    /// An `Error` message is passed through and moves the loop to `Failed`.
    pub fn poll(&mut self) -> Vec<ChannelMessage> {
        let mut out: Vec<ChannelMessage> = self.pending.drain(..).collect();
        let Slot::Running(handle) = &mut self.slot else {
            return out;
        };
        let mut failure = None;
        while out.len() < self.capacity {
            let Some(msg) = handle.try_take() else {
                break;
            };
            if let ChannelMessage::Error(reason) = &msg {
                failure = Some(reason.clone());
                out.push(msg);
                break;
            }
            out.push(msg);
        }
        if let Some(reason) = failure {
            handle.stop();
            self.slot = Slot::Failed(reason);
        }
        out
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::ManualBackend;
    use std::time::Instant;

    fn settings(port: &str) -> LinkSettings {
        LinkSettings::new(port, 9600).with_read_timeout(Duration::from_millis(10))
    }

    fn poll_until(lp: &mut AcquisitionLoop, want: usize) -> Vec<ChannelMessage> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.len() < want && Instant::now() < deadline {
            got.extend(lp.poll());
            thread::sleep(Duration::from_millis(2));
        }
        got
    }

    #[test]
    fn malformed_lines_never_reach_the_channel() {
        let backend = ManualBackend::new(["1.5,20.0", "abc,20.0", "1.5", "1.5,20.0,30", ""]);
        let mut lp = AcquisitionLoop::new(Arc::new(backend), settings("READER-T1"), 16);
        lp.start().unwrap();
        let got = poll_until(&mut lp, 1);
        thread::sleep(Duration::from_millis(30));
        let mut all = got;
        all.extend(lp.poll());
        assert_eq!(
            all,
            vec![ChannelMessage::Data {
                flow: 1.5,
                volume: 20.0
            }]
        );
        lp.stop();
        assert_eq!(lp.state(), LoopState::Idle);
    }

    #[test]
    fn open_failure_is_one_error_and_terminal() {
        let backend = ManualBackend::unavailable("port not found");
        let mut lp = AcquisitionLoop::new(Arc::new(backend), settings("READER-T2"), 16);
        assert_eq!(lp.state(), LoopState::Idle);
        lp.start().unwrap();
        assert!(matches!(lp.state(), LoopState::Failed(_)));
        assert!(!PortLease::is_held("READER-T2"));
        let got = lp.poll();
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], ChannelMessage::Error(_)));
        assert!(matches!(lp.state(), LoopState::Failed(_)));
        lp.stop();
        assert!(matches!(lp.state(), LoopState::Failed(_)));
        assert!(lp.poll().is_empty());
        assert!(!PortLease::is_held("READER-T2"));
    }

    #[test]
    fn read_failure_follows_the_data_already_read() {
        let backend = ManualBackend::failing_after(["1,10", "2,20"], "device unplugged");
        let mut lp = AcquisitionLoop::new(Arc::new(backend), settings("READER-T3"), 16);
        lp.start().unwrap();
        let got = poll_until(&mut lp, 3);
        assert_eq!(got.len(), 3);
        assert_eq!(
            got[1],
            ChannelMessage::Data {
                flow: 2.0,
                volume: 20.0
            }
        );
        assert!(matches!(got[2], ChannelMessage::Error(_)));
        assert!(matches!(lp.state(), LoopState::Failed(_)));
    }

    #[test]
    fn stop_returns_promptly_and_releases_the_port() {
        let backend = ManualBackend::new(Vec::<String>::new());
        let mut handle = spawn_reader(Arc::new(backend), settings("READER-T4"), 4).unwrap();
        assert!(PortLease::is_held("READER-T4"));
        let started = Instant::now();
        assert!(handle.stop().is_empty());
        assert!(handle.stop().is_empty());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(handle.is_stopped());
        assert!(!PortLease::is_held("READER-T4"));
    }

    #[test]
    fn overlapping_start_on_same_port_is_busy() {
        let backend: Arc<dyn LinkBackend> = Arc::new(ManualBackend::default());
        let mut first = AcquisitionLoop::new(Arc::clone(&backend), settings("READER-T5"), 4);
        let mut second = AcquisitionLoop::new(backend, settings("READER-T5"), 4);
        first.start().unwrap();
        assert_eq!(
            second.start().unwrap_err(),
            LinkError::PortBusy {
                port: "READER-T5".into()
            }
        );
        assert_eq!(second.state(), LoopState::Idle);
        first.stop();
        second.start().unwrap();
        assert!(second.is_running());
    }

    #[test]
    fn full_channel_applies_backpressure_without_loss() {
        let lines: Vec<String> = (0..10).map(|i| format!("{i},{i}")).collect();
        let mut lp = AcquisitionLoop::new(
            Arc::new(ManualBackend::new(lines)),
            settings("READER-T6"),
            2,
        );
        lp.start().unwrap();
        let got = poll_until(&mut lp, 10);
        let flows: Vec<f64> = got
            .iter()
            .filter_map(|m| match m {
                ChannelMessage::Data { flow, .. } => Some(*flow),
                ChannelMessage::Error(_) => None,
            })
            .collect();
        assert_eq!(flows, (0..10).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn stop_keeps_readings_nobody_polled_yet() {
        let backend = ManualBackend::new(["1,10", "2,20", "3,30"]);
        let mut lp = AcquisitionLoop::new(Arc::new(backend), settings("READER-T7"), 16);
        lp.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        lp.stop();
        assert_eq!(lp.state(), LoopState::Idle);
        let flows: Vec<f64> = lp
            .poll()
            .into_iter()
            .filter_map(|m| match m {
                ChannelMessage::Data { flow, .. } => Some(flow),
                ChannelMessage::Error(_) => None,
            })
            .collect();
        assert_eq!(flows, vec![1.0, 2.0, 3.0]);
        assert!(lp.poll().is_empty());
    }

    #[test]
    fn stop_drains_a_full_channel_without_loss() {
        let lines: Vec<String> = (0..8).map(|i| format!("{i},{i}")).collect();
        let mut handle = spawn_reader(
            Arc::new(ManualBackend::new(lines)),
            settings("READER-T8"),
            2,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        let got = handle.stop();
        assert!(got.len() >= 2);
        let flows: Vec<f64> = got
            .iter()
            .filter_map(|m| match m {
                ChannelMessage::Data { flow, .. } => Some(*flow),
                ChannelMessage::Error(_) => None,
            })
            .collect();
        assert_eq!(flows, (0..flows.len() as u32).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn open_failure_reports_unavailable_from_spawn() {
        let backend = ManualBackend::unavailable("gone");
        let err = spawn_reader(Arc::new(backend), settings("READER-T9"), 4)
            .err()
            .unwrap();
        assert!(matches!(err, LinkError::LinkUnavailable { .. }));
        assert!(!PortLease::is_held("READER-T9"));
    }
}
