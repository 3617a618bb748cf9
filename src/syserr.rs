//! Human-readable operating system error codes.
use std::{fmt, io};

/// Windows `ERROR_CALL_NOT_IMPLEMENTED`.
pub const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;

/// An operating system error code paired with the text the OS associates with it.
///
/// Displays as `(code) text`, which is the form every registrar and runtime
/// message embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemError {
    code: u32,
    text: String,
}

impl SystemError {
    /// Builds an error from a code and an already known description.
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            code,
            text: trim_line_endings(&text).to_string(),
        }
    }

    /// Looks up the system description for `code`.
    pub fn from_code(code: u32) -> Self {
        Self::new(code, describe(code))
    }

    /// Captures the calling thread's last OS error (`GetLastError` / `errno`).
    pub fn last() -> Self {
        Self::from_io(&io::Error::last_os_error())
    }

    /// Converts an I/O error that wraps a raw OS error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::from_code(code as u32),
            None => Self::new(ERROR_CALL_NOT_IMPLEMENTED, err.to_string()),
        }
    }

    /// Error reported by backends on targets without a service control manager.
    pub fn unsupported() -> Self {
        Self::new(
            ERROR_CALL_NOT_IMPLEMENTED,
            "This function is not supported on this system.",
        )
    }

    /// The numeric OS error code.
    pub fn code(&self) -> u32 {
        self.code
    }

    /// The description without the code prefix.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.text)
    }
}

impl std::error::Error for SystemError {}

/// Formats `code` as `(code) text`.
pub fn format_system_error(code: u32) -> String {
    SystemError::from_code(code).to_string()
}

fn trim_line_endings(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

#[cfg(windows)]
fn describe(code: u32) -> String {
    use std::ptr;
    use winapi::um::winbase::{
        FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM,
        FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW, LocalFree,
    };
    use winapi::um::winnt::{LANG_NEUTRAL, LPWSTR, MAKELANGID, SUBLANG_DEFAULT};

    let mut buffer: LPWSTR = ptr::null_mut();
    // With ALLOCATE_BUFFER the system writes the address of a LocalAlloc'd
    // buffer into `buffer`, which must be released with LocalFree.
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_ALLOCATE_BUFFER
                | FORMAT_MESSAGE_FROM_SYSTEM
                | FORMAT_MESSAGE_IGNORE_INSERTS,
            ptr::null(),
            code,
            MAKELANGID(LANG_NEUTRAL, SUBLANG_DEFAULT) as u32,
            (&mut buffer as *mut LPWSTR) as LPWSTR,
            0,
            ptr::null_mut(),
        )
    };

    if len == 0 || buffer.is_null() {
        return format!("Unknown error {code}");
    }

    let text = unsafe {
        let chars = std::slice::from_raw_parts(buffer, len as usize);
        String::from_utf16_lossy(chars)
    };
    unsafe {
        LocalFree(buffer as _);
    }
    text
}

#[cfg(unix)]
fn describe(code: u32) -> String {
    nix::errno::Errno::from_raw(code as i32).desc().to_string()
}

#[cfg(not(any(windows, unix)))]
fn describe(code: u32) -> String {
    format!("Unknown error {code}")
}
