use std::time::Duration;

const ASSISTANT_TIMEOUT_BASE_SECONDS: u64 = 10;
const ASSISTANT_TIMEOUT_LONG_SECONDS: u64 = 20;
const ASSISTANT_TIMEOUT_EXTENDED_SECONDS: u64 = 40;

pub fn assistant_timeout_for_prompt_chars(prompt_chars: usize) -> Duration {
    let seconds = if prompt_chars >= 24_000 {
        ASSISTANT_TIMEOUT_EXTENDED_SECONDS
    } else if prompt_chars >= 8_000 {
        ASSISTANT_TIMEOUT_LONG_SECONDS
    } else {
        ASSISTANT_TIMEOUT_BASE_SECONDS
    };
    Duration::from_secs(seconds)
}
