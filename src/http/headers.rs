/// Ordered, case-insensitive HTTP header multi-map.
///
/// Headers keep their insertion order (so responses serialize in the same
/// order they were built) and allow duplicate keys, which HTTP permits for
/// fields like `Set-Cookie`. Key comparison is ASCII-case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a header, keeping any existing values for the same key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replaces all values for `key` with a single value.
    ///
    /// The new value takes the position of the first removed entry, or is
    /// appended at the end if the key was not present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let position = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&key));

        self.entries
            .retain(|(k, _)| !k.eq_ignore_ascii_case(&key));

        match position {
            Some(index) => self.entries.insert(index, (key, value.into())),
            None => self.entries.push((key, value.into())),
        }
    }

    /// Returns the first value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key` in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Removes every value for `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries
            .retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = HeaderMap::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}
