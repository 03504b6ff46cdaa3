//! Process exit code conventions shared by the runner and the CLI.

pub const SUCCESS: i32 = 0;
pub const GENERAL_ERROR: i32 = 1;
pub const CONFIG_ERROR: i32 = 2;
pub const TIMEOUT: i32 = 124;
pub const BACKEND_NOT_FOUND: i32 = 127;
pub const INTERRUPTED: i32 = 130;

/// Conventional exit code for a termination signal: 128 + signal number.
/// Unknown signals fall back to the interrupt code.
pub fn for_signal(signo: i32) -> i32 {
    match signo {
        1 | 2 | 3 | 15 => 128 + signo,
        _ => INTERRUPTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signals_map_to_128_plus_number() {
        assert_eq!(for_signal(1), 129); // HUP
        assert_eq!(for_signal(2), 130); // INT
        assert_eq!(for_signal(3), 131); // QUIT
        assert_eq!(for_signal(15), 143); // TERM
    }

    #[test]
    fn unknown_signal_falls_back_to_interrupt() {
        assert_eq!(for_signal(99), INTERRUPTED);
        assert_eq!(for_signal(0), INTERRUPTED);
    }
}
