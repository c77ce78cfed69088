//! Proptest strategies for request inputs.

use proptest::prelude::*;

/// Free text including LIKE wildcards and the escape character
pub fn filter_text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 %_\\\\]{0,12}"
}

/// Text a query string value can carry
pub fn query_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 %_&=+\\[\\]-]{1,24}"
}

pub fn page_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=8
}
