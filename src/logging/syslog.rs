//! # Host syslog side-channel.
//!
//! SYSLOG records are written to `debug.log` like any other record and are
//! additionally handed to a [`SyslogSink`]. The sink is called from the single
//! consumer task only.

use std::ffi::CString;

/// Destination for mirrored SYSLOG records.
pub trait SyslogSink: Send + Sync + 'static {
    /// Forwards one already-stripped message. Must not panic on odd input.
    fn send(&self, message: &str);
}

/// Discards everything (syslog mirroring disabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSyslog;

impl SyslogSink for NullSyslog {
    fn send(&self, _message: &str) {}
}

/// Mirrors to the host system log through `openlog(3)`/`syslog(3)`.
#[derive(Debug)]
pub struct HostSyslog {
    // openlog(3) keeps the pointer; the string must outlive every syslog call.
    _ident: CString,
}

impl HostSyslog {
    /// Opens the host syslog with the given ident (facility `LOG_USER`).
    #[allow(unsafe_code)] // openlog(3) FFI
    pub fn open(ident: &str) -> Self {
        let ident = sanitize(ident);
        // SAFETY: `ident` is a valid NUL-terminated string owned by `self`,
        // which lives as long as the sink.
        unsafe { libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_USER) };
        Self { _ident: ident }
    }
}

impl SyslogSink for HostSyslog {
    #[allow(unsafe_code)] // syslog(3) FFI
    fn send(&self, message: &str) {
        let msg = sanitize(message);
        // SAFETY: constant "%s" format with one valid C string argument.
        unsafe { libc::syslog(libc::LOG_INFO, c"%s".as_ptr(), msg.as_ptr()) };
    }
}

impl Drop for HostSyslog {
    #[allow(unsafe_code)] // closelog(3) FFI
    fn drop(&mut self) {
        // SAFETY: closelog has no preconditions.
        unsafe { libc::closelog() };
    }
}

/// Interior NULs cannot cross the C boundary; they are removed.
fn sanitize(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}
