//! In-memory output backend for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use super::engine::OutputBackend;
use super::types::{AudioData, OutputEvent, SessionId};
use crate::error::DeviceError;

#[derive(Debug)]
pub struct MockLog {
    pub opened: usize,
    pub resumed: usize,
    pub suspended: bool,
    pub started: Vec<SessionId>,
    pub stopped: Vec<SessionId>,
    pub active: Option<SessionId>,
    /// Times a source was started while another was still attached.
    pub overlaps: usize,
    pub gains: Vec<f32>,
    pub closed: bool,
    pub fail_open: bool,
    pub events: VecDeque<OutputEvent>,
}

impl Default for MockLog {
    fn default() -> Self {
        Self {
            opened: 0,
            resumed: 0,
            suspended: true,
            started: Vec::new(),
            stopped: Vec::new(),
            active: None,
            overlaps: 0,
            gains: Vec::new(),
            closed: false,
            fail_open: false,
            events: VecDeque::new(),
        }
    }
}

impl MockLog {
    /// Play the active source to its end.
    pub fn finish_active(&mut self) {
        if let Some(id) = self.active.take() {
            self.events.push_back(OutputEvent::SessionEnded(id));
        }
    }

    pub fn current_gain(&self) -> Option<f32> {
        self.gains.last().copied()
    }
}

pub type SharedLog = Rc<RefCell<MockLog>>;

pub struct MockOutput {
    log: SharedLog,
}

impl MockOutput {
    /// An opener closure for `PlaybackController::new` plus the log it writes to.
    pub fn opener() -> (impl FnMut() -> Result<MockOutput, DeviceError>, SharedLog) {
        let log = SharedLog::default();
        let shared = log.clone();
        let opener = move || {
            let mut l = shared.borrow_mut();
            if l.fail_open {
                return Err(DeviceError::NoDevice);
            }
            l.opened += 1;
            Ok(MockOutput {
                log: shared.clone(),
            })
        };
        (opener, log)
    }
}

impl OutputBackend for MockOutput {
    fn is_suspended(&self) -> bool {
        self.log.borrow().suspended
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        let mut log = self.log.borrow_mut();
        log.resumed += 1;
        log.suspended = false;
        Ok(())
    }

    fn start(&mut self, session: SessionId, _buffer: Arc<AudioData>) -> Result<(), DeviceError> {
        let mut log = self.log.borrow_mut();
        if log.suspended {
            return Err(DeviceError::Resume("started while suspended".to_string()));
        }
        if log.active.is_some() {
            log.overlaps += 1;
        }
        log.active = Some(session);
        log.started.push(session);
        Ok(())
    }

    fn stop(&mut self, session: SessionId) {
        let mut log = self.log.borrow_mut();
        if log.active == Some(session) {
            log.active = None;
        }
        log.stopped.push(session);
    }

    fn set_gain(&mut self, gain: f32) {
        self.log.borrow_mut().gains.push(gain);
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        self.log.borrow_mut().events.pop_front()
    }

    fn close(&mut self) {
        let mut log = self.log.borrow_mut();
        log.active = None;
        log.closed = true;
    }
}
