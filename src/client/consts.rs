pub const BACKEND_URL: &str = "BACKEND_URL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const GENERATE_RESPONSE_PATH: &str = "generate-response";
pub const TRANSCRIBE_PATH: &str = "transcribe";

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const AUDIO_FIELD: &str = "audio";
pub const SESSION_ID_FIELD: &str = "session_id";
