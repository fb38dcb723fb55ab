//! Property-based tests for the round-trip laws and invariants named in §8.

use proptest::prelude::*;

fn placeholder_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,9}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    // Avoid `{`/`}` so rendered output can't be mistaken for another placeholder.
    "[a-zA-Z0-9 ,.!?-]{0,20}".prop_map(|s| s)
}

proptest! {
    /// Instruction templating round-trip: rendering `instr.get(k, **vars)`
    /// and re-extracting placeholders yields `vars.keys()`.
    #[test]
    fn instruction_render_roundtrips_placeholder_keys(
        keys in prop::collection::hash_set(placeholder_key_strategy(), 1..5),
        values in prop::collection::vec(value_strategy(), 1..5),
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let values: Vec<String> = values.into_iter().cycle().take(keys.len()).collect();

        let mut vars: std::collections::HashMap<&str, String> = std::collections::HashMap::new();
        let mut template = String::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            template.push_str(&format!("{{{key}}} "));
            vars.insert(key.as_str(), value.clone());
        }

        let mut bundle = crate::templating::InstructionBundle::new();
        bundle.set("test_action", template);

        let rendered = bundle.render("test_action", &vars);
        prop_assert!(rendered.is_ok());

        let mut extracted = bundle.placeholders("test_action").unwrap();
        let mut expected: Vec<String> = keys.clone();
        extracted.sort();
        expected.sort();
        prop_assert_eq!(extracted, expected);
    }

    /// Rendering fails (never panics or silently substitutes) when a
    /// placeholder has no matching argument.
    #[test]
    fn instruction_render_errors_on_missing_arg(key in placeholder_key_strategy()) {
        let mut bundle = crate::templating::InstructionBundle::new();
        bundle.set("test_action", format!("{{{key}}}"));
        let vars = std::collections::HashMap::new();
        prop_assert!(bundle.render("test_action", &vars).is_err());
    }

    /// Image insertion order: for any two images A, B with positions
    /// pA < pB, A's insert call precedes B's (§8).
    #[test]
    fn images_insert_in_ascending_position_order(
        positions in prop::collection::vec(0u32..1000, 0..20),
    ) {
        let images: Vec<crate::model::Image> = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| crate::model::Image {
                local_path: format!("/tmp/img{i}.jpg"),
                filename: format!("img{i}.jpg"),
                alt_text: String::new(),
                caption: String::new(),
                position,
                is_featured: false,
                source_url: None,
            })
            .collect();

        let ordered = crate::model::images_in_insertion_order(&images);
        for window in ordered.windows(2) {
            prop_assert!(window[0].position <= window[1].position);
        }
        prop_assert_eq!(ordered.len(), images.len());
    }

    /// Linear retry backoff is monotonically non-decreasing in the retry
    /// number, per the per-phase retry loop in §4.7.
    #[test]
    fn retry_backoff_is_monotonic(
        base_secs in 1u64..100,
        retry_a in 1u32..20,
        retry_b in 1u32..20,
    ) {
        let settings = crate::config::Settings {
            retry: crate::config::RetryConfig {
                base_retry_delay_seconds: base_secs,
                ..crate::config::RetryConfig::default()
            },
            ..crate::config::Settings::default()
        };
        let delay_a = settings.retry_delay(retry_a);
        let delay_b = settings.retry_delay(retry_b);
        if retry_a <= retry_b {
            prop_assert!(delay_a <= delay_b);
        } else {
            prop_assert!(delay_a > delay_b);
        }
    }
}
