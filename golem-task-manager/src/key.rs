// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::Location;

use uuid::Uuid;

/// A single identity component of a [`TaskKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum KeyAtom {
    Bool(bool),
    Int(i32),
    Long(i64),
    Str(String),
    Type(TypeId),
    Source {
        file: String,
        line: u32,
        column: u32,
    },
    Unique(Uuid),
    Hashed {
        type_id: TypeId,
        fingerprint: u64,
    },
}

/// Identity of a logical task queue inside a [`KeyedTaskManager`].
///
/// A key is a non-empty *set* of atoms: two keys are equal iff their atom
/// sets are equal, regardless of the order they were combined in, and
/// hashing agrees with equality. [`TaskKey::combined`] unions the operands'
/// atoms, so combining a key with itself (or with a subset of itself) yields
/// an equal key.
///
/// [`KeyedTaskManager`]: crate::KeyedTaskManager
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    // sorted and deduplicated, so the derived PartialEq/Hash see a set
    atoms: Vec<KeyAtom>,
}

impl TaskKey {
    fn from_atom(atom: KeyAtom) -> Self {
        Self { atoms: vec![atom] }
    }

    /// A key no other `TaskKey` will ever be equal to.
    pub fn fresh() -> Self {
        Self::from_atom(KeyAtom::Unique(Uuid::new_v4()))
    }

    /// A key derived from the caller's source location (file, line, column).
    ///
    /// Two call sites on different lines produce distinct keys; a helper
    /// function calling this returns the same key from every call site of
    /// the helper (the location captured is the helper's own line).
    #[track_caller]
    pub fn from_caller() -> Self {
        let location = Location::caller();
        Self::from_atom(KeyAtom::Source {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        })
    }

    /// A key carrying the identity of the type `T` itself.
    pub fn of_type<T: 'static>() -> Self {
        Self::from_atom(KeyAtom::Type(TypeId::of::<T>()))
    }

    /// A key derived from any hashable value, discriminated by its type.
    ///
    /// The value is reduced to a 64-bit fingerprint; values of different
    /// types never collide with each other or with the other constructors.
    pub fn of<T: Hash + 'static>(value: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Self::from_atom(KeyAtom::Hashed {
            type_id: TypeId::of::<T>(),
            fingerprint: hasher.finish(),
        })
    }

    /// The set union of both keys' atoms.
    ///
    /// Atoms already present are ignored, so `a.combined(&b) == b.combined(&a)`
    /// and `a.combined(&a) == a`.
    #[must_use]
    pub fn combined(&self, other: &TaskKey) -> TaskKey {
        let mut atoms = self.atoms.clone();
        for atom in &other.atoms {
            if !atoms.contains(atom) {
                atoms.push(atom.clone());
            }
        }
        atoms.sort();
        TaskKey { atoms }
    }
}

impl From<bool> for TaskKey {
    fn from(value: bool) -> Self {
        Self::from_atom(KeyAtom::Bool(value))
    }
}

impl From<i32> for TaskKey {
    fn from(value: i32) -> Self {
        Self::from_atom(KeyAtom::Int(value))
    }
}

impl From<i64> for TaskKey {
    fn from(value: i64) -> Self {
        Self::from_atom(KeyAtom::Long(value))
    }
}

impl From<&str> for TaskKey {
    fn from(value: &str) -> Self {
        Self::from_atom(KeyAtom::Str(value.to_string()))
    }
}

impl From<String> for TaskKey {
    fn from(value: String) -> Self {
        Self::from_atom(KeyAtom::Str(value))
    }
}
