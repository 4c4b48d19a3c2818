//! Task persistence on top of a key-value slot.
//!
//! The whole task list lives as one JSON array under [`TODOS_KEY`] and is
//! rewritten on every mutation.

use crate::error::StoreError;
use crate::models::{NewTask, Task, TaskKey};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub const TODOS_KEY: &str = "todos";
pub const BACKUP_KEY: &str = "todos.corrupt";
const SEQ_KEY: &str = "todos.seq";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
pub struct FileKeyValue {
    dir: PathBuf,
}

impl FileKeyValue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKeyValue {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write aside and rename so readers never see a half-written blob
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| StoreError::Io { path, source })
    }
}

#[derive(Default)]
pub struct MemoryKeyValue {
    slots: RefCell<HashMap<String, String>>,
    read_only: Cell<bool>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `set` fail, as a full disk would.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }
}

impl KeyValueStore for MemoryKeyValue {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.read_only.get() {
            return Err(StoreError::Io {
                path: PathBuf::from(key),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "store is read-only"),
            });
        }
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Id-addressed operations the application works against.
pub trait TaskRepository {
    fn list(&self) -> Vec<Task>;
    fn insert(&self, task: NewTask) -> Result<Task, StoreError>;
    fn finish(&self, id: u64) -> Result<Task, StoreError>;
    fn delete(&self, id: u64) -> Result<Task, StoreError>;
}

impl<R: TaskRepository + ?Sized> TaskRepository for Rc<R> {
    fn list(&self) -> Vec<Task> {
        (**self).list()
    }

    fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        (**self).insert(task)
    }

    fn finish(&self, id: u64) -> Result<Task, StoreError> {
        (**self).finish(id)
    }

    fn delete(&self, id: u64) -> Result<Task, StoreError> {
        (**self).delete(id)
    }
}

pub struct TaskStore<K> {
    kv: K,
}

impl<K: KeyValueStore> TaskStore<K> {
    /// Opens the store and gives stable ids to records written without one.
    pub fn open(kv: K) -> Result<Self, StoreError> {
        let store = Self { kv };

        let mut tasks = store.read_or_recover()?;
        if tasks.iter().any(|task| task.id == 0) {
            let mut next = store.next_id(&tasks)?;
            let mut assigned = 0;
            for task in tasks.iter_mut().filter(|task| task.id == 0) {
                task.id = next;
                next += 1;
                assigned += 1;
            }
            store.kv.set(SEQ_KEY, &(next - 1).to_string())?;
            store.persist(&tasks)?;
            info!("Assigned ids to {} stored tasks", assigned);
        }

        Ok(store)
    }

    #[cfg(test)]
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Every stored task in insertion order, failing on unreadable data.
    pub fn try_load(&self) -> Result<Vec<Task>, StoreError> {
        match self.kv.get(TODOS_KEY)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Every stored task in insertion order. Never fails: unreadable data
    /// yields an empty list and a backup copy under [`BACKUP_KEY`].
    pub fn load(&self) -> Vec<Task> {
        self.read_or_recover().unwrap_or_else(|err| {
            warn!("Failed to load tasks: {}", err);
            Vec::new()
        })
    }

    pub fn append(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let mut tasks = self.read_or_recover()?;
        let id = self.next_id(&tasks)?;
        let task = new_task.with_id(id);
        tasks.push(task.clone());
        // A failed append must store nothing, so the id is claimed first.
        self.kv.set(SEQ_KEY, &id.to_string())?;
        self.persist(&tasks)?;
        debug!("Appended task {} ({} stored)", id, tasks.len());
        Ok(task)
    }

    /// Drops every task matching `key`, returning how many went.
    pub fn remove(&self, key: &TaskKey) -> Result<usize, StoreError> {
        let mut tasks = self.read_or_recover()?;
        let before = tasks.len();
        tasks.retain(|task| !task.matches(key));
        self.persist(&tasks)?;
        Ok(before - tasks.len())
    }

    /// Sets `finished` on every task matching `key`, returning how many matched.
    pub fn mark_finished(&self, key: &TaskKey) -> Result<usize, StoreError> {
        let mut tasks = self.read_or_recover()?;
        let mut matched = 0;
        for task in tasks.iter_mut().filter(|task| task.matches(key)) {
            task.finished = true;
            matched += 1;
        }
        self.persist(&tasks)?;
        Ok(matched)
    }

    fn read_or_recover(&self) -> Result<Vec<Task>, StoreError> {
        let raw = match self.kv.get(TODOS_KEY)? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Vec::new()),
        };

        match serde_json::from_str(&raw) {
            Ok(tasks) => Ok(tasks),
            Err(err) => {
                warn!(
                    "Stored tasks are unreadable, continuing with an empty list (copy kept under '{}'): {}",
                    BACKUP_KEY, err
                );
                if let Err(backup_err) = self.kv.set(BACKUP_KEY, &raw) {
                    warn!("Failed to back up unreadable tasks: {}", backup_err);
                }
                Ok(Vec::new())
            }
        }
    }

    fn next_id(&self, tasks: &[Task]) -> Result<u64, StoreError> {
        let seq = self
            .kv
            .get(SEQ_KEY)?
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let max_id = tasks.iter().map(|task| task.id).max().unwrap_or(0);
        Ok(seq.max(max_id) + 1)
    }

    fn persist(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let content = serde_json::to_string(tasks)?;
        self.kv.set(TODOS_KEY, &content)
    }

    fn update_by_id(
        &self,
        id: u64,
        apply: impl FnOnce(&mut Vec<Task>, usize) -> Task,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.read_or_recover()?;
        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let task = apply(&mut tasks, index);
        self.persist(&tasks)?;
        Ok(task)
    }
}

impl<K: KeyValueStore> TaskRepository for TaskStore<K> {
    fn list(&self) -> Vec<Task> {
        self.load()
    }

    fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        self.append(task)
    }

    fn finish(&self, id: u64) -> Result<Task, StoreError> {
        self.update_by_id(id, |tasks, index| {
            tasks[index].finished = true;
            tasks[index].clone()
        })
    }

    fn delete(&self, id: u64) -> Result<Task, StoreError> {
        self.update_by_id(id, |tasks, index| tasks.remove(index))
    }
}
