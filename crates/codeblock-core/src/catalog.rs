//! Built-in exercises shown in the lobby

use tracing::info;

use crate::models::Block;
use crate::storage::{BlockStore, StorageResult};

fn exercise(id: &str, title: &str, starter: &str, solution: &str) -> Block {
    Block::new(id, title, starter, Some(solution.to_string()))
}

/// The six lobby exercises, in lobby order
pub fn lobby() -> Vec<Block> {
    vec![
        exercise(
            "async",
            "Async case",
            "async function fetchData(url) {\n  const response = fetch(url);\n  return response.json();\n}\n",
            "async function fetchData(url) {\n  const response = await fetch(url);\n  return response.json();\n}\n",
        ),
        exercise(
            "dom",
            "DOM manipulation",
            "function setTitle(text) {\n  const el = document.getElementById('title');\n}\n",
            "function setTitle(text) {\n  const el = document.getElementById('title');\n  el.textContent = text;\n}\n",
        ),
        exercise(
            "array",
            "Array methods",
            "function doubleAll(xs) {\n  return xs;\n}\n",
            "function doubleAll(xs) {\n  return xs.map(x => x * 2);\n}\n",
        ),
        exercise(
            "event",
            "Event loop",
            "function logOrder(log) {\n  setTimeout(() => log('timeout'), 0);\n  log('sync');\n}\n",
            "function logOrder(log) {\n  setTimeout(() => log('timeout'), 0);\n  Promise.resolve().then(() => log('microtask'));\n  log('sync');\n}\n",
        ),
        exercise(
            "error",
            "Error handling",
            "function parse(text) {\n  return JSON.parse(text);\n}\n",
            "function parse(text) {\n  try {\n    return JSON.parse(text);\n  } catch (err) {\n    return null;\n  }\n}\n",
        ),
        exercise(
            "data",
            "Data structures",
            "function uniqueCount(xs) {\n  return xs.length;\n}\n",
            "function uniqueCount(xs) {\n  return new Set(xs).size;\n}\n",
        ),
    ]
}

/// Insert every lobby exercise missing from `store`
///
/// Returns how many were inserted. Existing blocks are left untouched.
pub fn seed(store: &dyn BlockStore) -> StorageResult<usize> {
    let mut inserted = 0;
    for block in lobby() {
        if store.insert_if_missing(&block)? {
            inserted += 1;
        }
    }
    if inserted > 0 {
        info!("Seeded {} exercise(s)", inserted);
    }
    Ok(inserted)
}
