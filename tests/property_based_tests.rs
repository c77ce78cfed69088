mod common;

use common::strategies::*;
use common::{builder, numbered_store};
use proptest::prelude::*;
use query_config::query_builder::conditions::like_matches;
use query_config::query_builder::contains_pattern;
use query_config::{
    FetchQuery, FilterMode, FilterType, LengthAwarePaginator, QueryBuilder, RequestInput, SortOrder,
};

proptest! {
    /// Property: an escaped contains pattern matches any text holding the needle
    #[test]
    fn contains_pattern_matches_embedding_text(
        prefix in filter_text_strategy(),
        needle in filter_text_strategy(),
        suffix in filter_text_strategy(),
    ) {
        let text = format!("{prefix}{needle}{suffix}");
        prop_assert!(like_matches(&text, &contains_pattern(&needle)));
    }

    /// Property: wildcards in the needle are literal
    #[test]
    fn contains_pattern_never_matches_missing_needle(
        text in "[a-c]{0,16}",
        needle in "[a-c%_]{0,4}[x%_][a-c]{0,4}",
    ) {
        prop_assert_eq!(
            like_matches(&text, &contains_pattern(&needle)),
            text.contains(&needle)
        );
    }

    /// Property: bracketed filter keys decode to the value that was sent
    #[test]
    fn bracket_keys_preserve_values(value in query_value_strategy()) {
        let query = serde_urlencoded::to_string([("name[value]", value.as_str()), ("name[not]", "1")]).unwrap();
        let input = RequestInput::from_query_str(&query).unwrap();
        prop_assert_eq!(input.string("name.value"), Some(value));
        prop_assert_eq!(input.boolean("name.not"), Some(true));
    }

    /// Property: a type's default mode is one of its modes and every mode token parses back
    #[test]
    fn filter_type_modes_are_consistent(filter_type in prop::sample::select(FilterType::ALL.to_vec())) {
        prop_assert!(filter_type.allows(filter_type.default_mode()));
        for mode in filter_type.modes() {
            prop_assert_eq!(mode.as_str().parse::<FilterMode>(), Ok(*mode));
        }
        prop_assert!(!filter_type.value_rules().is_empty());
    }

    /// Property: offset pages cover the total without gaps
    #[test]
    fn offset_pages_cover_total(total in 0u64..500, per_page in page_size_strategy(), page in 1u32..80) {
        let start = u64::from(page - 1) * u64::from(per_page);
        let len = total.saturating_sub(start).min(u64::from(per_page));
        let items = vec![serde_json::Value::Null; len as usize];
        let paginator = LengthAwarePaginator::new(items, total, per_page, page);

        prop_assert!(paginator.last_page() * u64::from(per_page) >= total);
        prop_assert!(paginator.last_page() >= 1);
        match (paginator.from(), paginator.to()) {
            (Some(from), Some(to)) => {
                prop_assert_eq!(from, start + 1);
                prop_assert!(to <= total);
            }
            (None, None) => prop_assert_eq!(len, 0),
            other => prop_assert!(false, "inconsistent bounds {:?}", other),
        }
    }

    /// Property: walking cursors visits every row exactly once, in order
    #[test]
    fn cursor_walk_partitions_rows(rows in 0usize..25, per_page in page_size_strategy(), descending in any::<bool>()) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = numbered_store(rows);
        let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
        let mut query = builder(&store);
        query.order_by("size", order);

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = runtime.block_on(query.cursor_paginate(per_page, cursor.as_deref())).unwrap();
            prop_assert!(page.items.len() <= per_page as usize);
            seen.extend(page.items.iter().filter_map(|row| row["id"].as_u64()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut expected: Vec<u64> = (1..=rows as u64).collect();
        expected.sort_by_key(|id| (id % 7, *id));
        if descending {
            expected.sort_by(|a, b| (b % 7).cmp(&(a % 7)).then(a.cmp(b)));
        }
        prop_assert_eq!(seen, expected);
    }
}
