use super::value::{ObjString, Value};
use std::rc::Rc;

const MAX_LOAD: f64 = 0.75;

struct Entry {
    key: Option<Rc<ObjString>>,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry {
            key: None,
            value: Value::Nil,
        }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Open-addressed hash table with linear probing and tombstone deletion.
/// Used both as the VM's globals table (name -> value) and, via
/// [`Table::intern`], as the session-wide string-interning set.
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the index of `key`'s slot, or the first empty/tombstone slot
    /// probed (preferring the earliest tombstone) if the key is absent.
    fn find_entry(entries: &[Entry], key: &Rc<ObjString>) -> usize {
        let capacity = entries.len();
        let mut index = (key.hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match &entry.key {
                None => {
                    if entry.is_tombstone() {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(existing) => {
                    if Rc::ptr_eq(existing, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow_capacity(capacity: usize) -> usize {
        if capacity < 8 {
            8
        } else {
            capacity * 2
        }
    }

    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut new_entries: Vec<Entry> = (0..new_capacity).map(|_| Entry::empty()).collect();

        self.count = 0;
        for entry in self.entries.drain(..) {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&new_entries, &key);
                new_entries[index] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                self.count += 1;
            }
        }

        self.entries = new_entries;
    }

    fn ensure_capacity(&mut self) {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            self.adjust_capacity(Self::grow_capacity(self.capacity()));
        }
    }

    /// Inserts or overwrites `key`. Returns `true` if `key` was not already
    /// present.
    pub fn set(&mut self, key: Rc<ObjString>, value: Value) -> bool {
        self.ensure_capacity();

        let index = Self::find_entry(&self.entries, &key);
        let is_new_key = self.entries[index].key.is_none();
        if is_new_key && !self.entries[index].is_tombstone() {
            self.count += 1;
        }

        self.entries[index] = Entry {
            key: Some(key),
            value,
        };
        is_new_key
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::find_entry(&self.entries, key);
        self.entries[index].key.as_ref()?;
        Some(self.entries[index].value.clone())
    }

    /// Removes `key`, leaving a tombstone so later probes still traverse
    /// past this slot. Returns `true` if the key was present.
    pub fn del(&mut self, key: &Rc<ObjString>) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        if self.entries[index].key.is_none() {
            return false;
        }
        self.entries[index] = Entry {
            key: None,
            value: Value::Bool(true),
        };
        true
    }

    /// Content-based lookup used only by [`Table::intern`]: the candidate
    /// string hasn't been interned yet, so there's no `Rc` to compare by
    /// identity.
    fn find_string(&self, text: &str, hash: u32) -> Option<Rc<ObjString>> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    if key.hash == hash && key.text == text {
                        return Some(Rc::clone(key));
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Returns the canonical `Rc<ObjString>` for `text`, allocating and
    /// registering a new one if this is the first time it's been seen.
    pub fn intern(&mut self, text: &str) -> Rc<ObjString> {
        let hash = super::value::fnv1a_hash(text.as_bytes());
        if let Some(existing) = self.find_string(text, hash) {
            return existing;
        }
        let obj = Rc::new(ObjString {
            text: text.to_string(),
            hash,
        });
        self.set(Rc::clone(&obj), Value::Nil);
        obj
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> Rc<ObjString> {
        Rc::new(ObjString::new(text.to_string()))
    }

    #[test]
    fn set_get_del_roundtrip() {
        let mut table = Table::new();
        let k = key("name");
        assert!(table.set(Rc::clone(&k), Value::Number(1.0)));
        assert_eq!(table.get(&k), Some(Value::Number(1.0)));
        assert!(table.del(&k));
        assert_eq!(table.get(&k), None);
    }

    #[test]
    fn set_returns_false_on_overwrite() {
        let mut table = Table::new();
        let k = key("name");
        assert!(table.set(Rc::clone(&k), Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&k), Value::Number(2.0)));
        assert_eq!(table.get(&k), Some(Value::Number(2.0)));
    }

    #[test]
    fn tombstones_do_not_break_probe_chains() {
        let mut table = Table::new();
        // force several keys into the same small table and ensure deleting
        // one doesn't hide lookups of another that collided past it.
        let keys: Vec<_> = (0..20).map(|i| key(&format!("k{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        table.del(&keys[3]);
        table.del(&keys[7]);
        for (i, k) in keys.iter().enumerate() {
            if i == 3 || i == 7 {
                assert_eq!(table.get(k), None);
            } else {
                assert_eq!(table.get(k), Some(Value::Number(i as f64)));
            }
        }
    }

    #[test]
    fn interning_returns_same_rc_for_equal_content() {
        let mut table = Table::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
        let c = table.intern("world");
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn grows_past_load_factor_and_survives_rehash() {
        let mut table = Table::new();
        let keys: Vec<_> = (0..200).map(|i| key(&format!("key-{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn get_on_empty_table_is_none() {
        let table = Table::new();
        assert_eq!(table.get(&key("missing")), None);
    }
}
