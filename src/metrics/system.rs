//! Static host facts and uptime.

use super::{ProcFs, SampleError};
use serde::{Deserialize, Serialize};

/// Host identity, captured once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Kernel name, e.g. "Linux" or "Darwin"
    pub platform: String,
    pub platform_release: String,
    pub platform_version: String,
    /// Machine hardware name, e.g. "x86_64" or "arm64"
    pub architecture: String,
    pub hostname: String,
}

impl SystemInfo {
    #[cfg(unix)]
    pub fn detect() -> Self {
        use std::ffi::CStr;
        use std::mem::MaybeUninit;

        let mut uts = MaybeUninit::<libc::utsname>::uninit();
        let result = unsafe { libc::uname(uts.as_mut_ptr()) };
        if result != 0 {
            return Self::fallback();
        }
        let uts = unsafe { uts.assume_init() };

        fn field(raw: &[libc::c_char]) -> String {
            unsafe { CStr::from_ptr(raw.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        }

        Self {
            platform: field(&uts.sysname[..]),
            platform_release: field(&uts.release[..]),
            platform_version: field(&uts.version[..]),
            architecture: field(&uts.machine[..]),
            hostname: field(&uts.nodename[..]),
        }
    }

    #[cfg(not(unix))]
    pub fn detect() -> Self {
        Self::fallback()
    }

    fn fallback() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            platform_release: String::new(),
            platform_version: String::new(),
            architecture: std::env::consts::ARCH.to_string(),
            hostname: "unknown".to_string(),
        }
    }

    /// arm64 Darwin, which gets the Apple Silicon power profile
    pub fn is_apple_silicon(&self) -> bool {
        self.platform == "Darwin" && matches!(self.architecture.as_str(), "arm64" | "aarch64")
    }
}

/// Seconds since boot from /proc/uptime
pub fn uptime(procfs: &ProcFs) -> Result<f64, SampleError> {
    let content = procfs.read("uptime")?;
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| procfs.parse_error("uptime", format!("unexpected content {:?}", content.trim())))
}
