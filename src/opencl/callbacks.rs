use std::ffi::{c_char, c_void, CStr};

/// Context notification callback type
pub type ContextNotifyCallback = Option<
    unsafe extern "C" fn(
        errinfo: *const c_char,
        private_info: *const c_void,
        cb: usize,
        user_data: *mut c_void,
    )
>;

/// Forwards asynchronous context errors reported by the runtime to the log
pub unsafe extern "C" fn log_context_error(
    errinfo: *const c_char,
    _private_info: *const c_void,
    _cb: usize,
    _user_data: *mut c_void,
) {
    if errinfo.is_null() {
        tracing::error!("OpenCL context error (no details)");
        return;
    }
    let message = CStr::from_ptr(errinfo).to_string_lossy();
    tracing::error!(%message, "OpenCL context error");
}
