use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};

/// Whether the calling thread currently has a host calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    Attached,
    Detached,
}

/// Value crossing a host method call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Unit,
    Int(i64),
    Str(String),
}

/// The host runtime's per-thread calling convention.
///
/// Implemented by the embedding layer (a managed VM, a scripting host, a
/// test double). Every method is called on the thread whose status it
/// concerns.
pub trait HostRuntime: Send + Sync {
    /// `Err` when the host cannot report a status at all.
    fn thread_status(&self) -> Result<AttachStatus, String>;

    fn attach_current_thread(&self) -> Result<(), String>;

    fn detach_current_thread(&self);

    /// Invoke a host-side method. Only called while the thread is attached.
    fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, String>;
}

/// Scoped access to the host calling context.
#[derive(Clone)]
pub struct RuntimeBridge {
    runtime: Arc<dyn HostRuntime>,
}

impl RuntimeBridge {
    pub fn new(runtime: Arc<dyn HostRuntime>) -> Self {
        Self { runtime }
    }

    /// Obtain a context for the current thread, attaching it if needed.
    ///
    /// The returned guard detaches on drop only if this call attached.
    pub fn attach(&self) -> BridgeResult<HostContext<'_>> {
        let status = self
            .runtime
            .thread_status()
            .map_err(BridgeError::BridgeUnavailable)?;

        let attached_here = match status {
            AttachStatus::Attached => false,
            AttachStatus::Detached => {
                self.runtime
                    .attach_current_thread()
                    .map_err(BridgeError::BridgeUnavailable)?;
                log::trace!(target: "hostbridge::host", "attached {:?}", std::thread::current().id());
                true
            }
        };

        Ok(HostContext {
            runtime: self.runtime.as_ref(),
            attached_here,
            _thread_bound: PhantomData,
        })
    }

    /// Run `f` with a host context; a temporary attachment is released on every
    /// exit path, including errors and panics unwinding through `f`.
    pub fn with_host_context<R, F>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&HostContext<'_>) -> BridgeResult<R>,
    {
        let ctx = self.attach()?;
        f(&ctx)
    }
}

/// Proof that the current thread may call into the host.
///
/// Not `Send`: an attachment belongs to the thread that made it.
pub struct HostContext<'a> {
    runtime: &'a dyn HostRuntime,
    attached_here: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl HostContext<'_> {
    /// True if this guard owns the attachment and will detach on drop.
    #[inline]
    pub fn attached_here(&self) -> bool {
        self.attached_here
    }

    pub fn call(&self, method: &str, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.runtime
            .invoke(method, args)
            .map_err(|reason| BridgeError::HostCall {
                method: method.to_string(),
                reason,
            })
    }

    pub fn call_void(&self, method: &str) -> BridgeResult<()> {
        self.call(method, &[]).map(|_| ())
    }

    pub fn call_string(&self, method: &str) -> BridgeResult<String> {
        match self.call(method, &[])? {
            HostValue::Str(s) => Ok(s),
            other => Err(BridgeError::HostCall {
                method: method.to_string(),
                reason: format!("expected string, got {other:?}"),
            }),
        }
    }

    pub fn call_with_string(&self, method: &str, arg: &str) -> BridgeResult<()> {
        self.call(method, &[HostValue::Str(arg.to_string())]).map(|_| ())
    }

    pub fn call_with_ints(&self, method: &str, a: i32, b: i32) -> BridgeResult<()> {
        self.call(method, &[HostValue::Int(a as i64), HostValue::Int(b as i64)])
            .map(|_| ())
    }
}

impl Drop for HostContext<'_> {
    fn drop(&mut self) {
        if self.attached_here {
            self.runtime.detach_current_thread();
            log::trace!(target: "hostbridge::host", "detached {:?}", std::thread::current().id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::FakeRuntime;

    #[test]
    fn detached_thread_is_attached_then_released() {
        let rt = Arc::new(FakeRuntime::new());
        let bridge = RuntimeBridge::new(rt.clone());

        let seen = bridge
            .with_host_context(|ctx| {
                assert!(ctx.attached_here());
                Ok(rt.is_current_attached())
            })
            .unwrap();

        assert!(seen);
        assert!(!rt.is_current_attached());
        assert_eq!(rt.attach_count(), 1);
        assert_eq!(rt.detach_count(), 1);
    }

    #[test]
    fn already_attached_thread_is_left_alone() {
        let rt = Arc::new(FakeRuntime::new());
        rt.attach_current_thread().unwrap();
        let bridge = RuntimeBridge::new(rt.clone());

        bridge
            .with_host_context(|ctx| {
                assert!(!ctx.attached_here());
                Ok(())
            })
            .unwrap();

        assert!(rt.is_current_attached());
        assert_eq!(rt.detach_count(), 0);
    }

    #[test]
    fn error_path_still_detaches() {
        let rt = Arc::new(FakeRuntime::new());
        let bridge = RuntimeBridge::new(rt.clone());

        let res: BridgeResult<()> = bridge.with_host_context(|ctx| {
            ctx.call_void("missingMethod")?;
            Ok(())
        });

        assert!(matches!(res, Err(BridgeError::HostCall { .. })));
        assert!(!rt.is_current_attached());
        assert_eq!(rt.detach_count(), 1);
    }

    #[test]
    fn panic_path_still_detaches() {
        let rt = Arc::new(FakeRuntime::new());
        let bridge = RuntimeBridge::new(rt.clone());

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: BridgeResult<()> = bridge.with_host_context(|_| panic!("boom"));
        }));

        assert!(res.is_err());
        assert!(!rt.is_current_attached());
        assert_eq!(rt.detach_count(), 1);
    }

    #[test]
    fn refused_attach_is_bridge_unavailable() {
        let rt = Arc::new(FakeRuntime::new());
        rt.refuse_attach(true);
        let bridge = RuntimeBridge::new(rt.clone());

        let mut ran = false;
        let res = bridge.with_host_context(|_| {
            ran = true;
            Ok(())
        });

        assert!(matches!(res, Err(BridgeError::BridgeUnavailable(_))));
        assert!(!ran);
        assert_eq!(rt.detach_count(), 0);
    }

    #[test]
    fn string_call_type_mismatch_is_host_call_error() {
        let rt = Arc::new(FakeRuntime::new());
        rt.set_reply("getCount", HostValue::Int(3));
        let bridge = RuntimeBridge::new(rt);

        let res = bridge.with_host_context(|ctx| ctx.call_string("getCount"));
        assert!(matches!(res, Err(BridgeError::HostCall { .. })));
    }
}
