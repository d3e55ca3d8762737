//! Generated artifact set: relative path -> file content.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The page a hosting target serves at its root.
pub const ENTRY_PAGE: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
}

impl ArtifactContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ArtifactContent::Text(s) => s.as_bytes(),
            ArtifactContent::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether the artifact set came from the generator or the fallback builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    Generated,
    Fallback,
}

/// Ordered mapping from normalised relative path to content.
///
/// Invariant (enforced by `new`): non-empty and contains [`ENTRY_PAGE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawArtifactSet")]
pub struct GeneratedArtifactSet {
    files: BTreeMap<String, ArtifactContent>,
}

/// Wire shape of [`GeneratedArtifactSet`]; deserialised sets go through `new`.
#[derive(Deserialize)]
struct RawArtifactSet {
    files: BTreeMap<String, ArtifactContent>,
}

impl TryFrom<RawArtifactSet> for GeneratedArtifactSet {
    type Error = ArtifactSetError;

    fn try_from(raw: RawArtifactSet) -> Result<Self, Self::Error> {
        Self::new(raw.files)
    }
}

/// Why a candidate file map is not a valid artifact set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactSetError {
    #[error("artifact set is empty")]
    Empty,

    #[error("invalid artifact path '{0}'")]
    InvalidPath(String),

    #[error("duplicate artifact path '{0}'")]
    DuplicatePath(String),

    #[error("missing entry page '{ENTRY_PAGE}'")]
    MissingEntryPage,
}

impl GeneratedArtifactSet {
    /// Build a set from `(path, content)` pairs, normalising and checking paths.
    pub fn new<I, P>(entries: I) -> Result<Self, ArtifactSetError>
    where
        I: IntoIterator<Item = (P, ArtifactContent)>,
        P: AsRef<str>,
    {
        let mut files = BTreeMap::new();
        for (path, content) in entries {
            let normalised = normalise_path(path.as_ref())?;
            if files.insert(normalised.clone(), content).is_some() {
                return Err(ArtifactSetError::DuplicatePath(normalised));
            }
        }
        if files.is_empty() {
            return Err(ArtifactSetError::Empty);
        }
        if !files.contains_key(ENTRY_PAGE) {
            return Err(ArtifactSetError::MissingEntryPage);
        }
        Ok(Self { files })
    }

    /// Infallible constructor for sets built inside the crate from known-good
    /// static paths (the fallback page).
    pub(crate) fn from_entry_page(
        html: String,
        extras: impl IntoIterator<Item = (&'static str, ArtifactContent)>,
    ) -> Self {
        let mut files: BTreeMap<String, ArtifactContent> = extras
            .into_iter()
            .map(|(path, content)| (path.to_string(), content))
            .collect();
        files.insert(ENTRY_PAGE.to_string(), ArtifactContent::Text(html));
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&ArtifactContent> {
        self.files.get(path)
    }

    pub fn entry_page(&self) -> &ArtifactContent {
        // The constructor guarantees the entry page exists.
        &self.files[ENTRY_PAGE]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtifactContent)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c))
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(ArtifactContent::len).sum()
    }
}

/// Strip leading `./` and `/`, reject empty paths, `..`, backslashes, and any
/// `.git` component (case-insensitive) so a file cannot land in a repository's
/// metadata directory.
pub fn normalise_path(raw: &str) -> Result<String, ArtifactSetError> {
    let invalid = || ArtifactSetError::InvalidPath(raw.to_string());

    let trimmed = raw.trim();
    if trimmed.contains('\\') || trimmed.contains('\0') {
        return Err(invalid());
    }

    let mut parts = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid()),
            p if p.eq_ignore_ascii_case(".git") => return Err(invalid()),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn text(s: &str) -> ArtifactContent {
        ArtifactContent::Text(s.to_string())
    }

    #[test]
    fn set_requires_entry_page() {
        let err = GeneratedArtifactSet::new([("about.html", text("x"))]).unwrap_err();
        assert_eq!(err, ArtifactSetError::MissingEntryPage);
    }

    #[test]
    fn set_rejects_empty_input() {
        let entries: Vec<(&str, ArtifactContent)> = Vec::new();
        assert_eq!(
            GeneratedArtifactSet::new(entries).unwrap_err(),
            ArtifactSetError::Empty
        );
    }

    #[test]
    fn normalised_duplicates_are_rejected() {
        let err = GeneratedArtifactSet::new([
            ("index.html", text("a")),
            ("./index.html", text("b")),
        ])
        .unwrap_err();
        assert_eq!(err, ArtifactSetError::DuplicatePath("index.html".to_string()));
    }

    #[test]
    fn iteration_is_path_ordered() {
        let set = GeneratedArtifactSet::new([
            ("style.css", text("body{}")),
            ("index.html", text("<h1>hi</h1>")),
            ("assets/app.js", text("1")),
        ])
        .unwrap();
        assert_eq!(set.paths(), vec!["assets/app.js", "index.html", "style.css"]);
        assert_eq!(set.entry_page(), &text("<h1>hi</h1>"));
        assert_eq!(set.total_bytes(), 6 + 11 + 1);
    }

    #[rstest]
    #[case::leading_dot("./a/b.js", "a/b.js")]
    #[case::leading_slash("/index.html", "index.html")]
    #[case::double_slash("a//b.txt", "a/b.txt")]
    fn paths_are_normalised(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalise_path(raw).unwrap(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::dot_only("./")]
    #[case::parent("../etc/passwd")]
    #[case::nested_parent("a/../../b")]
    #[case::backslash("a\\b")]
    #[case::git_config(".git/config")]
    #[case::nested_git_upper("a/.GIT/x")]
    #[case::git_hooks("./.Git/hooks/pre-commit")]
    fn bad_paths_are_rejected(#[case] raw: &str) {
        assert!(matches!(normalise_path(raw), Err(ArtifactSetError::InvalidPath(_))));
    }

    #[test]
    fn git_lookalikes_are_allowed() {
        assert_eq!(normalise_path(".gitignore").unwrap(), ".gitignore");
        assert_eq!(normalise_path("docs/.github/x.md").unwrap(), "docs/.github/x.md");
    }

    #[test]
    fn deserialisation_enforces_the_invariant() {
        let empty = serde_json::json!({ "files": {} });
        assert!(serde_json::from_value::<GeneratedArtifactSet>(empty).is_err());

        let no_entry = serde_json::json!({
            "files": { "about.html": { "kind": "text", "value": "x" } }
        });
        assert!(serde_json::from_value::<GeneratedArtifactSet>(no_entry).is_err());

        let smuggled = serde_json::json!({
            "files": {
                "index.html": { "kind": "text", "value": "ok" },
                ".git/config": { "kind": "text", "value": "[core]" }
            }
        });
        assert!(serde_json::from_value::<GeneratedArtifactSet>(smuggled).is_err());
    }

    #[test]
    fn serialised_set_round_trips_through_new() {
        let set = GeneratedArtifactSet::new([("index.html", text("<p>x</p>"))]).unwrap();
        let json = serde_json::to_value(&set).unwrap();
        let back: GeneratedArtifactSet = serde_json::from_value(json).unwrap();
        assert_eq!(back.entry_page(), &text("<p>x</p>"));
    }
}
