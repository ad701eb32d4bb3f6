use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::thread::{self, ThreadId};

use hostbridge_core::host::{method, AttachStatus, HostRuntime, HostValue};

/// Host-side requests the engine makes; delivered to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum VmRequest {
    Caption(String),
    Toast(String),
    SurfaceSize(i64, i64),
    Finish,
}

/// A stand-in for the managed VM: tracks which threads are attached and
/// answers the host method table.
pub struct SimVm {
    attached: Mutex<HashSet<ThreadId>>,
    caption: Mutex<String>,
    package: String,
    data_dir: String,
    ui: Sender<VmRequest>,
}

impl SimVm {
    pub fn new(package: &str, data_dir: &str, ui: Sender<VmRequest>) -> Self {
        Self {
            attached: Mutex::new(HashSet::new()),
            caption: Mutex::new(package.to_string()),
            package: package.to_string(),
            data_dir: data_dir.to_string(),
            ui,
        }
    }

    fn forward(&self, req: VmRequest) -> Result<HostValue, String> {
        self.ui
            .send(req)
            .map_err(|_| "ui thread is gone".to_string())?;
        Ok(HostValue::Unit)
    }
}

fn str_arg(args: &[HostValue], i: usize) -> Result<String, String> {
    match args.get(i) {
        Some(HostValue::Str(s)) => Ok(s.clone()),
        other => Err(format!("argument {i}: expected string, got {other:?}")),
    }
}

fn int_arg(args: &[HostValue], i: usize) -> Result<i64, String> {
    match args.get(i) {
        Some(HostValue::Int(v)) => Ok(*v),
        other => Err(format!("argument {i}: expected int, got {other:?}")),
    }
}

impl HostRuntime for SimVm {
    fn thread_status(&self) -> Result<AttachStatus, String> {
        Ok(if self.attached.lock().contains(&thread::current().id()) {
            AttachStatus::Attached
        } else {
            AttachStatus::Detached
        })
    }

    fn attach_current_thread(&self) -> Result<(), String> {
        let t = thread::current();
        log::debug!(target: "host_sim::vm", "attach {:?} ({})", t.id(), t.name().unwrap_or("?"));
        self.attached.lock().insert(t.id());
        Ok(())
    }

    fn detach_current_thread(&self) {
        let id = thread::current().id();
        log::debug!(target: "host_sim::vm", "detach {id:?}");
        self.attached.lock().remove(&id);
    }

    fn invoke(&self, name: &str, args: &[HostValue]) -> Result<HostValue, String> {
        if !self.attached.lock().contains(&thread::current().id()) {
            return Err(format!("{name} called from a detached thread"));
        }

        match name {
            method::INTERNAL_DATA_PATH => Ok(HostValue::Str(format!("{}/files", self.data_dir))),
            method::EXTERNAL_DATA_PATH => Ok(HostValue::Str(format!("/sdcard/{}", self.package))),
            method::CACHE_PATH => Ok(HostValue::Str(format!("{}/cache", self.data_dir))),
            method::PACKAGE_NAME => Ok(HostValue::Str(self.package.clone())),
            method::PACKAGE_CODE_PATH => Ok(HostValue::Str(format!("{}/base.apk", self.data_dir))),
            method::SYSTEM_VERSION => Ok(HostValue::Str("14".to_string())),
            method::CAPTION => Ok(HostValue::Str(self.caption.lock().clone())),
            method::SET_CAPTION => {
                let caption = str_arg(args, 0)?;
                *self.caption.lock() = caption.clone();
                self.forward(VmRequest::Caption(caption))
            }
            method::SHOW_TOAST => self.forward(VmRequest::Toast(str_arg(args, 0)?)),
            method::CHANGE_SURFACE_SIZE => {
                self.forward(VmRequest::SurfaceSize(int_arg(args, 0)?, int_arg(args, 1)?))
            }
            method::FINISH => self.forward(VmRequest::Finish),
            other => Err(format!("no such method: {other}")),
        }
    }
}
