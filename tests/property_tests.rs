//! Property-based tests using proptest
//!
//! Key derivation must be a pure function of the model id, and every file
//! lands directly under the model prefix whatever its local nesting.

use model_packager::{ModelId, RemoteLocation};
use proptest::prelude::*;
use std::path::PathBuf;

/// Generate valid hub model ids like "org/model-name"
fn arb_model_id() -> impl Strategy<Value = String> {
    (
        "[a-zA-Z0-9][a-zA-Z0-9_.-]{0,20}",
        prop::option::of("[a-zA-Z0-9][a-zA-Z0-9_.-]{0,30}"),
    )
        .prop_filter("no dot-only segments", |(org, name)| {
            org != "." && org != ".." && name.as_deref().is_none_or(|n| n != "." && n != "..")
        })
        .prop_map(|(org, name)| match name {
            Some(name) => format!("{}/{}", org, name),
            None => org,
        })
}

proptest! {
    #[test]
    fn prefix_is_deterministic(id in arb_model_id()) {
        let a = ModelId::new(id.clone()).unwrap();
        let b = ModelId::new(id.clone()).unwrap();
        prop_assert_eq!(a.key_prefix(), b.key_prefix());
        prop_assert_eq!(a.key_prefix(), format!("models/{}", id));
    }

    #[test]
    fn keys_are_flat_under_prefix(
        id in arb_model_id(),
        dirs in prop::collection::vec("[a-z]{1,8}", 0..4),
        file in "[a-z]{1,12}\\.(json|safetensors|txt)",
    ) {
        let model_id = ModelId::new(id).unwrap();
        let location = RemoteLocation::for_model("my-bucket", &model_id);

        let mut path = PathBuf::from("/scratch");
        for d in &dirs {
            path.push(d);
        }
        path.push(&file);

        let key = location.key_for(&path).unwrap();
        prop_assert_eq!(key, format!("{}/{}", model_id.key_prefix(), file));
    }

    #[test]
    fn resource_name_is_valid(id in arb_model_id()) {
        let name = ModelId::new(id).unwrap().resource_name();
        prop_assert!(name.len() <= 63);
        prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
        prop_assert!(!name.starts_with('-') && !name.ends_with('-'));
    }

    #[test]
    fn whitespace_ids_rejected(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        let err = ModelId::new(format!("{} {}", a, b)).unwrap_err();
        prop_assert!(err.is_config());
    }
}
