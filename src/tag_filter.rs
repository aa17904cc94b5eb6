use std::collections::BTreeSet;

/// Caller-supplied set of tags selecting which compatibility groups run
///
/// An empty filter admits every group, and an untagged group is admitted by
/// every filter. Otherwise a group is admitted when it shares at least one
/// tag with the filter (exact, case-sensitive match).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    tags: BTreeSet<String>,
}

impl TagFilter {
    /// A filter that admits every group
    pub fn any() -> Self {
        Self::default()
    }

    /// Build a filter, trimming each tag and dropping empty ones
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Whether a group carrying `group_tags` is eligible under this filter
    pub fn admits(&self, group_tags: &[String]) -> bool {
        self.tags.is_empty()
            || group_tags.is_empty()
            || group_tags.iter().any(|t| self.tags.contains(t))
    }
}
