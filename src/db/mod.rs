// SPDX-License-Identifier: MIT

//! Database layer (Firestore user directory).

pub mod firestore;

pub use firestore::{DirectoryStore, FirestoreDb};
