//! Search behavior shared by every locally runnable backend.

use twinreg_core::{SearchRequest, ShellDescriptor, SortDirection, SubmodelDescriptor};
use twinreg_storage::{DocumentStore, LockedRegistry, RegistryError, ShellRegistry, SqliteStore};

fn backends() -> Vec<(&'static str, Box<dyn ShellRegistry>)> {
    vec![
        ("memory", Box::new(LockedRegistry::in_memory())),
        ("document", Box::new(DocumentStore::embedded())),
        ("sqlite", Box::new(SqliteStore::in_memory().unwrap())),
    ]
}

fn ids(shells: &[ShellDescriptor]) -> Vec<&str> {
    shells.iter().map(|s| s.id.as_str()).collect()
}

#[test]
fn test_nested_match_shrinks_to_matching_submodels() {
    for (name, registry) in backends() {
        registry
            .add_or_replace(
                ShellDescriptor::new("s1", "pump")
                    .with_submodel(SubmodelDescriptor::new("A", "alpha"))
                    .with_submodel(SubmodelDescriptor::new("B", "beta"))
                    .with_submodel(SubmodelDescriptor::new("C", "gamma")),
            )
            .unwrap();
        registry
            .add_or_replace(
                ShellDescriptor::new("s2", "valve")
                    .with_submodel(SubmodelDescriptor::new("D", "delta")),
            )
            .unwrap();

        let response = registry
            .search(&SearchRequest::matching("submodelDescriptors.idShort", "beta"))
            .unwrap();
        assert_eq!(response.total, 1, "{name}");
        assert_eq!(ids(&response.hits), vec!["s1"], "{name}");
        let matched: Vec<&str> = response.hits[0].submodel_ids().collect();
        assert_eq!(matched, vec!["B"], "{name}");

        // The stored shell is untouched.
        assert_eq!(registry.get_all_submodels("s1").unwrap().len(), 3, "{name}");
    }
}

#[test]
fn test_nested_regex_keeps_every_matching_submodel() {
    for (name, registry) in backends() {
        registry
            .add_or_replace(
                ShellDescriptor::new("s1", "pump")
                    .with_submodel(SubmodelDescriptor::new("A", "name-plate"))
                    .with_submodel(SubmodelDescriptor::new("B", "doc"))
                    .with_submodel(SubmodelDescriptor::new("C", "name-tag")),
            )
            .unwrap();

        let response = registry
            .search(&SearchRequest::regex("submodelDescriptors.idShort", "name-.*"))
            .unwrap();
        let matched: Vec<&str> = response.hits[0].submodel_ids().collect();
        assert_eq!(matched, vec!["A", "C"], "{name}");
    }
}

#[test]
fn test_shell_level_match_keeps_full_array() {
    for (name, registry) in backends() {
        registry
            .add_or_replace(
                ShellDescriptor::new("s1", "Main Pump")
                    .with_submodel(SubmodelDescriptor::new("A", "alpha"))
                    .with_submodel(SubmodelDescriptor::new("B", "beta")),
            )
            .unwrap();
        registry.add_or_replace(ShellDescriptor::new("s2", "pump house")).unwrap();
        registry.add_or_replace(ShellDescriptor::new("s3", "main valve")).unwrap();

        // Every token has to match.
        let response = registry.search(&SearchRequest::matching("idShort", "main pump")).unwrap();
        assert_eq!(ids(&response.hits), vec!["s1"], "{name}");
        assert_eq!(response.hits[0].submodel_descriptors.len(), 2, "{name}");
    }
}

#[test]
fn test_pages_partition_sorted_results() {
    for (name, registry) in backends() {
        for id in ["s3", "s1", "s5", "s2", "s4"] {
            registry.add_or_replace(ShellDescriptor::new(id, format!("shell {id}"))).unwrap();
        }

        let mut seen = Vec::new();
        for page in 0..3 {
            let request = SearchRequest::all()
                .sorted_by("id", SortDirection::Asc)
                .with_page(page, 2);
            let response = registry.search(&request).unwrap();
            assert_eq!(response.total, 5, "{name}");
            seen.push(ids(&response.hits).iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }
        assert_eq!(seen, vec![vec!["s1", "s2"], vec!["s3", "s4"], vec!["s5"]], "{name}");
    }
}

#[test]
fn test_multi_key_sort() {
    for (name, registry) in backends() {
        registry.add_or_replace(ShellDescriptor::new("a", "pump")).unwrap();
        registry.add_or_replace(ShellDescriptor::new("b", "valve")).unwrap();
        registry.add_or_replace(ShellDescriptor::new("c", "pump")).unwrap();

        let request = SearchRequest::all()
            .sorted_by("idShort", SortDirection::Desc)
            .sorted_by("id", SortDirection::Desc);
        let response = registry.search(&request).unwrap();
        assert_eq!(ids(&response.hits), vec!["b", "c", "a"], "{name}");
    }
}

#[test]
fn test_invalid_queries_are_rejected() {
    for (name, registry) in backends() {
        let err = registry.search(&SearchRequest::matching("", "x")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidQuery(_)), "{name}");
        let err = registry.search(&SearchRequest::regex("idShort", "(unclosed")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidQuery(_)), "{name}");

        // Unbalanced groups are rejected, not matched as an unanchored prefix.
        registry.add_or_replace(ShellDescriptor::new("s1", "pump station")).unwrap();
        let result = registry.search(&SearchRequest::regex("idShort", "pump)|(?:x"));
        assert!(matches!(result, Err(RegistryError::InvalidQuery(_))), "{name}");
    }
}
