// src/backend/utils/log.rs
// Canister logging. Inside a canister records go through the replica debug
// print; natively (unit tests, tooling) they go to stderr.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Formats a single-line record: `LEVEL [target] message`.
pub fn format_record(level: Level, target: &str, message: &str) -> String {
    format!("{} [{}] {}", level.as_str(), target, message)
}

pub fn emit(level: Level, target: &str, message: &str) {
    let record = format_record(level, target, message);
    #[cfg(target_arch = "wasm32")]
    ic_cdk::println!("{}", record);
    #[cfg(not(target_arch = "wasm32"))]
    eprintln!("{}", record);
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::utils::log::emit($crate::utils::log::Level::Info, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::utils::log::emit($crate::utils::log::Level::Warn, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::utils::log::emit($crate::utils::log::Level::Error, module_path!(), &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        assert_eq!(
            format_record(Level::Warn, "keepsake_backend::services", "sweep skipped"),
            "WARN [keepsake_backend::services] sweep skipped"
        );
    }
}
