//! A map of dense integer key to value.

use std::marker::PhantomData;

pub trait Index: From<usize> {
    fn index(&self) -> usize;
}

/// A map of a dense integer key to value, implemented as a vector.
/// Effectively wraps Vec<V> to provided typed keys.
pub struct DenseMap<K, V> {
    vec: Vec<V>,
    key_type: PhantomData<K>,
}

impl<K, V> Default for DenseMap<K, V> {
    fn default() -> Self {
        DenseMap {
            vec: Vec::default(),
            key_type: PhantomData,
        }
    }
}

impl<K: Index, V> std::ops::Index<K> for DenseMap<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &Self::Output {
        &self.vec[k.index()]
    }
}

impl<K: Index, V> std::ops::IndexMut<K> for DenseMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut Self::Output {
        &mut self.vec[k.index()]
    }
}

impl<K: Index, V> DenseMap<K, V> {
    pub fn lookup(&self, k: K) -> Option<&V> {
        self.vec.get(k.index())
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn next_id(&self) -> K {
        K::from(self.vec.len())
    }

    pub fn push(&mut self, val: V) -> K {
        let id = self.next_id();
        self.vec.push(val);
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.vec.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }
}

impl<K: Index, V: Clone> DenseMap<K, V> {
    pub fn new_sized(n: usize, default: V) -> Self {
        DenseMap {
            vec: vec![default; n],
            key_type: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Id(usize);
    impl Index for Id {
        fn index(&self) -> usize {
            self.0
        }
    }
    impl From<usize> for Id {
        fn from(i: usize) -> Self {
            Id(i)
        }
    }

    #[test]
    fn push_and_index() {
        let mut map: DenseMap<Id, &str> = DenseMap::default();
        let a = map.push("a");
        let b = map.push("b");
        assert_eq!((a, b), (Id(0), Id(1)));
        map[b] = "bee";
        assert_eq!(map.lookup(Id(1)), Some(&"bee"));
        assert_eq!(map.lookup(Id(2)), None);
        let ids: Vec<Id> = map.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![Id(0), Id(1)]);
    }

    #[test]
    fn sized() {
        let map: DenseMap<Id, Option<Id>> = DenseMap::new_sized(3, None);
        assert_eq!(map.len(), 3);
        assert!(map.iter().all(|(_, v)| v.is_none()));
    }
}
