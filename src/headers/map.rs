use super::{AsHeaderName, HeaderName, HeaderValue, IntoHeaderName};

/// HTTP Headers Multimap.
///
/// Fields keep their insertion order, which is also the order they are serialized in. Lookup is
/// case-insensitive.
#[derive(Clone, Default)]
pub struct HeaderMap {
    fields: Vec<HeaderField>,
}

/// A single header field.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderField {
    /// Returns the field name.
    #[inline]
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Returns the field value.
    #[inline]
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }
}

impl HeaderMap {
    /// Create new empty [`HeaderMap`].
    ///
    /// This function does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Create new empty [`HeaderMap`] with at least the specified capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { fields: Vec::with_capacity(capacity) }
    }

    /// Returns the number of fields, counting every value of multi-valued names.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `true` if the map contains a value for given name.
    #[inline]
    pub fn contains_key<K: AsHeaderName>(&self, name: K) -> bool {
        self.fields.iter().any(|f| name.matches(f.name.as_bytes()))
    }

    /// Returns the last value for given name.
    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.fields
            .iter()
            .rev()
            .find(|f| name.matches(f.name.as_bytes()))
            .map(|f| &f.value)
    }

    /// Returns every value for given name in insertion order.
    pub fn get_all<K: AsHeaderName>(&self, name: K) -> impl Iterator<Item = &HeaderValue> {
        self.fields
            .iter()
            .filter(move |f| name.matches(f.name.as_bytes()))
            .map(|f| &f.value)
    }

    /// Insert a value, replacing every existing value of the same name.
    ///
    /// The replaced field keeps its original position. Returns the previous last value.
    pub fn insert<K: IntoHeaderName, V: Into<HeaderValue>>(
        &mut self,
        name: K,
        value: V,
    ) -> Option<HeaderValue> {
        let name = name.into_header_name();
        let value = value.into();

        let Some(first) = self.fields.iter().position(|f| f.name == name) else {
            self.fields.push(HeaderField { name, value });
            return None;
        };

        let mut prev = Some(std::mem::replace(&mut self.fields[first].value, value));
        let mut i = first + 1;
        while i < self.fields.len() {
            if self.fields[i].name == name {
                prev = Some(self.fields.remove(i).value);
            } else {
                i += 1;
            }
        }
        prev
    }

    /// Append a value, keeping existing values of the same name.
    #[inline]
    pub fn append<K: IntoHeaderName, V: Into<HeaderValue>>(&mut self, name: K, value: V) {
        self.fields.push(HeaderField {
            name: name.into_header_name(),
            value: value.into(),
        });
    }

    /// Remove every value of given name, returning the last one.
    pub fn remove<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        let mut prev = None;
        self.fields.retain_mut(|f| {
            if name.matches(f.name.as_bytes()) {
                prev = Some(f.value.clone());
                false
            } else {
                true
            }
        });
        prev
    }

    /// Merge `other` into self, values in `other` win.
    pub fn extend_overriding(&mut self, other: &HeaderMap) {
        let mut seen = Vec::<&HeaderName>::new();
        for field in &other.fields {
            if !seen.contains(&&field.name) {
                self.remove(&field.name);
                seen.push(&field.name);
            }
        }
        self.fields.extend(other.fields.iter().cloned());
    }

    /// Returns an iterator over every field.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, HeaderField> {
        self.fields.iter()
    }

    /// Remove every field.
    #[inline]
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a HeaderField;
    type IntoIter = std::slice::Iter<'a, HeaderField>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl<K: IntoHeaderName, V: Into<HeaderValue>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

impl std::fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|e| (&e.name, &e.value)))
            .finish()
    }
}

impl std::fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderField")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}
