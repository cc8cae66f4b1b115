use super::Value;

/// Decoded STRUCT: field names and values in declared order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    fields: Vec<(String, Value)>,
}

impl StructValue {
    #[must_use]
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Value of the first field with this name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

/// Decoded LIST or fixed-size ARRAY.
///
/// Arrays carry their declared length; lists do not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    items: Vec<Value>,
    declared_len: Option<usize>,
}

impl Sequence {
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self {
            items,
            declared_len: None,
        }
    }

    #[must_use]
    pub fn array(items: Vec<Value>, declared_len: usize) -> Self {
        Self {
            items,
            declared_len: Some(declared_len),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Declared length for fixed-size arrays.
    #[must_use]
    pub fn declared_len(&self) -> Option<usize> {
        self.declared_len
    }

    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        self.declared_len.is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }
}

/// Decoded MAP: an ordered list of `{key, value}` structs, in the order the engine stored
/// them. Duplicate keys are kept as they are.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapValue {
    entries: Vec<StructValue>,
}

impl MapValue {
    pub const KEY: &'static str = "key";
    pub const VALUE: &'static str = "value";

    #[must_use]
    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(key, value)| {
                StructValue::new(vec![
                    (Self::KEY.to_string(), key),
                    (Self::VALUE.to_string(), value),
                ])
            })
            .collect();
        Self { entries }
    }

    /// Entries as the engine shapes them, one two-field struct per pair.
    #[must_use]
    pub fn entries(&self) -> &[StructValue] {
        &self.entries
    }

    /// Key/value pairs in stored order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().filter_map(|entry| {
            Some((entry.get_by_index(0)?, entry.get_by_index(1)?))
        })
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
