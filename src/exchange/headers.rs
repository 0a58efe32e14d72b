/// Single HTTP header entry with its original casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Ordered header multimap.
///
/// Insertion order, casing and duplicates are kept as-is; lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<Header>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Replaces every value of `name` with a single entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push(Header::new(name, value));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries
            .retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Groups values by case-insensitive name, in first-seen order, keeping
    /// the first-seen casing of each name.
    pub fn grouped(&self) -> Vec<(&str, Vec<&str>)> {
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();

        for header in &self.entries {
            match groups
                .iter_mut()
                .find(|(name, _)| name.eq_ignore_ascii_case(&header.name))
            {
                Some((_, values)) => values.push(header.value.as_str()),
                None => groups
                    .push((header.name.as_str(), vec![header.value.as_str()])),
            }
        }

        groups
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderList
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| Header::new(k, v))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_and_preserves_casing() {
        let headers: HeaderList =
            [("X-Request-ID", "abc"), ("x-request-id", "def")]
                .into_iter()
                .collect();

        assert_eq!(headers.get("X-REQUEST-ID"), Some("abc"));
        assert_eq!(headers.get_all("x-request-id"), vec!["abc", "def"]);

        let names: Vec<_> = headers
            .iter()
            .map(Header::name)
            .collect();
        assert_eq!(names, vec!["X-Request-ID", "x-request-id"]);
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut headers = HeaderList::new();
        headers.push("Vary", "Accept");
        headers.push("vary", "Origin");
        headers.set("VARY", "*");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Vary"), Some("*"));
    }

    #[test]
    fn test_grouped_keeps_first_casing_and_order() {
        let headers: HeaderList = [
            ("Vary", "Accept"),
            ("X-One", "1"),
            ("vary", "Origin"),
        ]
        .into_iter()
        .collect();

        let groups = headers.grouped();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], ("Vary", vec!["Accept", "Origin"]));
        assert_eq!(groups[1], ("X-One", vec!["1"]));
    }
}
