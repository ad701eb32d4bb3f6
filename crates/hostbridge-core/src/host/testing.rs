//! In-process [`HostRuntime`] double that records every attach, detach and call.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use super::{AttachStatus, HostRuntime, HostValue};

#[derive(Default)]
pub struct FakeRuntime {
    attached: Mutex<HashSet<ThreadId>>,
    replies: Mutex<HashMap<String, HostValue>>,
    calls: Mutex<Vec<(String, Vec<HostValue>)>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    refuse: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply returned by `invoke(method, ..)`. Methods without a reply fail.
    pub fn set_reply(&self, method: &str, value: HostValue) {
        self.replies.lock().insert(method.to_string(), value);
    }

    pub fn refuse_attach(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Relaxed);
    }

    pub fn is_current_attached(&self) -> bool {
        self.attached.lock().contains(&thread::current().id())
    }

    pub fn attached_threads(&self) -> usize {
        self.attached.lock().len()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::Relaxed)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<(String, Vec<HostValue>)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }
}

impl HostRuntime for FakeRuntime {
    fn thread_status(&self) -> Result<AttachStatus, String> {
        Ok(if self.is_current_attached() {
            AttachStatus::Attached
        } else {
            AttachStatus::Detached
        })
    }

    fn attach_current_thread(&self) -> Result<(), String> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err("attach refused".to_string());
        }
        self.attached.lock().insert(thread::current().id());
        self.attaches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn detach_current_thread(&self) {
        self.attached.lock().remove(&thread::current().id());
        self.detaches.fetch_add(1, Ordering::Relaxed);
    }

    fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, String> {
        if !self.is_current_attached() {
            return Err(format!("{method}: thread not attached"));
        }
        self.calls.lock().push((method.to_string(), args.to_vec()));
        self.replies
            .lock()
            .get(method)
            .cloned()
            .ok_or_else(|| format!("no such method: {method}"))
    }
}
