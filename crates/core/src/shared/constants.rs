pub const APP_DIR_NAME: &str = "Minutewise";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const SERVICE_TIMEOUT_SECS: u64 = 60;

/// Owner or deadline values extractors emit when they mean "nothing".
pub const PLACEHOLDER_VALUES: &[&str] = &[
    "unassigned",
    "unknown",
    "tbd",
    "tba",
    "not specified",
    "n/a",
    "na",
    "none",
    "null",
    "-",
];

pub const DEFAULT_VAGUE_DEADLINES: &[&str] = &[
    "soon",
    "asap",
    "as soon as possible",
    "when possible",
    "whenever",
    "later",
    "eventually",
    "at some point",
    "this week",
    "next week",
    "this month",
    "next month",
    "in a few days",
    "shortly",
];

pub const VAGUE_TASK_TERMS: &[&str] = &["something", "stuff", "thing", "things", "whatever", "etc"];
