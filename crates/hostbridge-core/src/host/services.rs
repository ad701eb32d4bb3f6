use parking_lot::Mutex;
use std::collections::HashMap;

use super::RuntimeBridge;
use crate::error::BridgeResult;

/// Host method names used by [`HostServices`].
pub mod method {
    pub const INTERNAL_DATA_PATH: &str = "getInternalDataPath";
    pub const EXTERNAL_DATA_PATH: &str = "getExternalDataPath";
    pub const CACHE_PATH: &str = "getCachePath";
    pub const PACKAGE_NAME: &str = "getPackageName";
    pub const PACKAGE_CODE_PATH: &str = "getPackageCodePath";
    pub const SYSTEM_VERSION: &str = "getSystemVersion";
    pub const CAPTION: &str = "getCaption";
    pub const SET_CAPTION: &str = "postChangeCaption";
    pub const SHOW_TOAST: &str = "postShowToastMessage";
    pub const CHANGE_SURFACE_SIZE: &str = "postChangeSurfaceSize";
    pub const FINISH: &str = "postFinish";
}

/// Typed calls back into the host, each made under a scoped attach.
///
/// Values that cannot change during the process lifetime are fetched once and
/// cached; a failed fetch is not cached.
pub struct HostServices {
    bridge: RuntimeBridge,
    cache: Mutex<HashMap<&'static str, String>>,
}

impl HostServices {
    pub fn new(bridge: RuntimeBridge) -> Self {
        Self {
            bridge,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached_string(&self, name: &'static str) -> BridgeResult<String> {
        if let Some(v) = self.cache.lock().get(name) {
            return Ok(v.clone());
        }
        let v = self.bridge.with_host_context(|ctx| ctx.call_string(name))?;
        self.cache.lock().insert(name, v.clone());
        Ok(v)
    }

    pub fn internal_data_path(&self) -> BridgeResult<String> {
        self.cached_string(method::INTERNAL_DATA_PATH)
    }

    pub fn external_data_path(&self) -> BridgeResult<String> {
        self.cached_string(method::EXTERNAL_DATA_PATH)
    }

    pub fn cache_path(&self) -> BridgeResult<String> {
        self.cached_string(method::CACHE_PATH)
    }

    pub fn package_name(&self) -> BridgeResult<String> {
        self.cached_string(method::PACKAGE_NAME)
    }

    pub fn package_code_path(&self) -> BridgeResult<String> {
        self.cached_string(method::PACKAGE_CODE_PATH)
    }

    pub fn system_version(&self) -> BridgeResult<String> {
        self.cached_string(method::SYSTEM_VERSION)
    }

    /// Not cached: the caption can be changed by either side.
    pub fn caption(&self) -> BridgeResult<String> {
        self.bridge
            .with_host_context(|ctx| ctx.call_string(method::CAPTION))
    }

    pub fn set_caption(&self, caption: &str) -> BridgeResult<()> {
        self.bridge
            .with_host_context(|ctx| ctx.call_with_string(method::SET_CAPTION, caption))
    }

    pub fn show_toast(&self, text: &str) -> BridgeResult<()> {
        self.bridge
            .with_host_context(|ctx| ctx.call_with_string(method::SHOW_TOAST, text))
    }

    /// Modal dialogs are not available; the text is shown as a toast and the
    /// first button (0) is reported as chosen.
    pub fn message_dialog(&self, text: &str, _caption: &str) -> BridgeResult<i32> {
        self.show_toast(text)?;
        Ok(0)
    }

    pub fn change_surface_size(&self, width: i32, height: i32) -> BridgeResult<()> {
        self.bridge
            .with_host_context(|ctx| ctx.call_with_ints(method::CHANGE_SURFACE_SIZE, width, height))
    }

    /// Ask the host to finish. Stopping the engine thread is the caller's job.
    pub fn request_finish(&self) -> BridgeResult<()> {
        self.bridge
            .with_host_context(|ctx| ctx.call_void(method::FINISH))
    }
}
