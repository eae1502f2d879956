mod autoparse;
mod fetch;

pub use autoparse::{
    needs_full_content, AppliedParse, AutoParser, ParseDecision, ParseEvent, AUTO_PARSE_COOLDOWN,
    MAX_PARSE_ATTEMPTS,
};
pub use fetch::{fetch_content, ContentError};
