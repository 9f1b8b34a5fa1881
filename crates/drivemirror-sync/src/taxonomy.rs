//! Folder taxonomy resolver
//!
//! Every account stores files under a fixed layout:
//!
//! ```text
//! My Drive
//! └── <root folder>          (configurable, "DriveMirror" by default)
//!     ├── Hotel IPTV
//!     ├── PC Room
//!     ├── Manual
//!     ├── Diskless
//!     └── Other
//! ```
//!
//! Folders are matched by name *within their expected parent only*; a
//! same-named folder elsewhere in the drive is never picked up.
//!
//! Runs for the same account are serialized so two concurrent uploads
//! cannot both miss the root folder and create it twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};

use drivemirror_core::domain::{AccountId, Category, FolderHierarchy, RemoteId};
use drivemirror_core::ports::{IRemoteStorage, RemoteError, RemoteObject};

pub struct TaxonomyResolver {
    storage: Arc<dyn IRemoteStorage>,
    root_folder_name: String,
    locks: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaxonomyResolver {
    pub fn new(storage: Arc<dyn IRemoteStorage>, root_folder_name: impl Into<String>) -> Self {
        Self {
            storage,
            root_folder_name: root_folder_name.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_folder_name(&self) -> &str {
        &self.root_folder_name
    }

    /// Finds or creates the root folder and every category folder under it
    ///
    /// Calling this again on an account that already has the layout only
    /// reads. Concurrent calls for `account_id` run one at a time.
    #[instrument(skip(self, token), fields(root = %self.root_folder_name))]
    pub async fn ensure_hierarchy(
        &self,
        account_id: &AccountId,
        token: &str,
    ) -> Result<FolderHierarchy, RemoteError> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        let top_level = self.storage.list_children(token, None).await?;
        let root_id = match find_folder(&top_level, &self.root_folder_name) {
            Some(id) => id,
            None => {
                let id = self
                    .storage
                    .create_folder(token, &self.root_folder_name, None)
                    .await?;
                info!(folder_id = %id, "Created root folder");
                id
            }
        };

        let children = self.storage.list_children(token, Some(&root_id)).await?;
        let mut categories = HashMap::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let name = category.folder_name();
            let id = match find_folder(&children, name) {
                Some(id) => id,
                None => {
                    let id = self.storage.create_folder(token, name, Some(&root_id)).await?;
                    info!(folder_id = %id, category = %category, "Created category folder");
                    id
                }
            };
            categories.insert(category, id);
        }

        debug!(root_id = %root_id, "Folder hierarchy ready");
        Ok(FolderHierarchy {
            root_id,
            categories,
        })
    }

    fn account_lock(&self, account_id: &AccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(*account_id).or_default())
    }
}

/// First folder named `name` among `objects`
///
/// `objects` must already be scoped to a single parent.
fn find_folder(objects: &[RemoteObject], name: &str) -> Option<RemoteId> {
    objects
        .iter()
        .find(|o| o.is_folder() && o.name == name)
        .map(|o| o.id.clone())
}
