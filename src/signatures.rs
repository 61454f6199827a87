// src/signatures.rs

//! Signature stores for pipelined compilation.
//!
//! A [`SignatureStore`] is an in-memory, opaque handle carrying the pickled
//! type signatures an upstream compilation publishes as soon as typechecking
//! finishes. A dependent assembles its dependency store by locating each
//! direct upstream's classes directory within its own raw classpath and
//! concatenating the upstream stores in classpath order. Ties are impossible
//! because classpath entries are distinct.

use std::path::PathBuf;
use std::sync::Arc;

use crate::project::ProjectName;

/// Pickled signatures published by one upstream compilation.
#[derive(Debug)]
pub struct PickledSignatures {
    pub origin: ProjectName,
    /// Classes directory the signatures belong to; used to locate the
    /// upstream within a dependent's classpath.
    pub classes_dir: PathBuf,
    /// Opaque signature payload. The scheduler never looks inside.
    pub bytes: Vec<u8>,
}

/// An ordered collection of pickled signatures.
#[derive(Debug, Clone, Default)]
pub struct SignatureStore {
    entries: Vec<Arc<PickledSignatures>>,
}

impl SignatureStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(signatures: PickledSignatures) -> Self {
        Self {
            entries: vec![Arc::new(signatures)],
        }
    }

    pub fn entries(&self) -> &[Arc<PickledSignatures>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Assemble the dependency store for a project from the stores of its
    /// direct upstreams.
    ///
    /// `upstream` pairs each upstream store with the candidate classes
    /// directories it may occupy on the dependent's classpath (read-only and
    /// newly-written). Stores are concatenated by ascending classpath index;
    /// an upstream absent from the classpath sorts last, preserving input
    /// order among such entries.
    pub fn merge_for_classpath(
        classpath: &[PathBuf],
        upstream: Vec<(SignatureStore, [PathBuf; 2])>,
    ) -> SignatureStore {
        let mut keyed: Vec<(usize, SignatureStore)> = upstream
            .into_iter()
            .map(|(store, dirs)| {
                let index = classpath
                    .iter()
                    .position(|entry| *entry == dirs[0] || *entry == dirs[1])
                    .unwrap_or(usize::MAX);
                (index, store)
            })
            .collect();
        keyed.sort_by_key(|(index, _)| *index);

        let mut entries = Vec::new();
        for (_, store) in keyed {
            entries.extend(store.entries.iter().cloned());
        }
        SignatureStore { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(origin: &str, classes_dir: &str) -> SignatureStore {
        SignatureStore::single(PickledSignatures {
            origin: origin.to_string(),
            classes_dir: classes_dir.into(),
            bytes: origin.as_bytes().to_vec(),
        })
    }

    #[test]
    fn merge_orders_by_classpath_index() {
        let classpath: Vec<PathBuf> =
            vec!["/cp/lib.jar".into(), "/cp/b".into(), "/cp/a".into()];
        let merged = SignatureStore::merge_for_classpath(
            &classpath,
            vec![
                (store("a", "/cp/a"), ["/cp/a".into(), "/new/a".into()]),
                (store("b", "/cp/b"), ["/cp/b".into(), "/new/b".into()]),
            ],
        );
        let origins: Vec<&str> = merged
            .entries()
            .iter()
            .map(|e| e.origin.as_str())
            .collect();
        assert_eq!(origins, vec!["b", "a"]);
    }

    #[test]
    fn upstream_missing_from_classpath_sorts_last() {
        let classpath: Vec<PathBuf> = vec!["/cp/a".into()];
        let merged = SignatureStore::merge_for_classpath(
            &classpath,
            vec![
                (store("x", "/cp/x"), ["/cp/x".into(), "/new/x".into()]),
                (store("a", "/cp/a"), ["/cp/a".into(), "/new/a".into()]),
            ],
        );
        let origins: Vec<&str> = merged
            .entries()
            .iter()
            .map(|e| e.origin.as_str())
            .collect();
        assert_eq!(origins, vec!["a", "x"]);
    }

    #[test]
    fn new_classes_dir_also_locates_an_upstream() {
        let classpath: Vec<PathBuf> = vec!["/new/a".into()];
        let merged = SignatureStore::merge_for_classpath(
            &classpath,
            vec![(store("a", "/cp/a"), ["/cp/a".into(), "/new/a".into()])],
        );
        assert_eq!(merged.len(), 1);
    }
}
