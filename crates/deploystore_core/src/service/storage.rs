//! Storage facade consumed by the distribution service.
//!
//! # Responsibility
//! - Assign ids, deployment keys and creation times for new entities.
//! - Enforce app/deployment/access-key visibility before every scoped call.
//! - Implement read-merge-write updates with optional optimistic versions.
//! - Pass blob operations through to the blob store.
//!
//! # Invariants
//! - An entity the caller may not see is reported as `NotFound`, exactly like
//!   an absent one.
//! - Denormalized `accountId`/`appId` fields are written in the same record
//!   as the entity they describe.
//! - Every backing-store failure leaves through `translate`.
//! - No in-process mutable state; concurrent updates without an expected
//!   version are last-writer-wins.

use crate::config::StorageConfig;
use crate::document::{
    from_document, merge_documents, string_field, to_document, Document, EntityKind, FieldFilter,
    WritePrecondition,
};
use crate::error::{translate, ErrorKind, StorageError, StorageResult};
use crate::ids;
use crate::model::access_key::{AccessKey, AccessKeyUpdate};
use crate::model::account::{reserved_profile_key, Account, AccountUpdate};
use crate::model::app::{
    mark_current_account, App, AppUpdate, CollaboratorInfo, CollaboratorMap, Permission,
};
use crate::model::deployment::{Deployment, DeploymentInfo, DeploymentUpdate, Package};
use crate::model::now_epoch_ms;
use crate::repo::blob_store::{BlobStore, FsBlobStore};
use crate::repo::entity_store::{EntityStore, SqliteEntityStore};
use crate::service::health;
use crate::signing::UrlSigner;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::time::{Duration, Instant};

/// Facade over the SQLite document store and filesystem bucket.
pub type LocalStorage = Storage<SqliteEntityStore, FsBlobStore>;

/// Persistence contract for accounts, apps, deployments, access keys and
/// release blobs.
pub struct Storage<E: EntityStore, B: BlobStore> {
    entities: E,
    blobs: B,
    blob_url_ttl: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollaboratorsPatch<'a> {
    collaborators: &'a CollaboratorMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipPatch<'a> {
    account_id: &'a str,
    collaborators: &'a CollaboratorMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountIdPatch<'a> {
    account_id: &'a str,
}

impl LocalStorage {
    /// Opens the document database and bucket described by `config`.
    ///
    /// # Errors
    /// - `Other` when the configuration is invalid.
    /// - `ConnectionFailed`/`Other` when either store cannot be opened.
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        config
            .validate()
            .map_err(|err| StorageError::other(err.to_string()))?;
        std::fs::create_dir_all(&config.data_dir).map_err(|err| translate(err.into()))?;

        let entities = SqliteEntityStore::open(config.database_path())?;
        let signer = config
            .credentials
            .as_ref()
            .map(|credentials| UrlSigner::new(credentials, config.bucket_name.clone()))
            .transpose()
            .map_err(|err| StorageError::other(err.to_string()))?;
        let blobs = FsBlobStore::open(
            config.bucket_root(),
            config.bucket_name.clone(),
            signer,
            config.public_base_url.clone(),
        )?;

        Ok(Self::new(entities, blobs).with_blob_url_ttl(config.blob_url_ttl))
    }
}

impl<E: EntityStore, B: BlobStore> Storage<E, B> {
    /// Builds a facade from explicitly constructed stores.
    pub fn new(entities: E, blobs: B) -> Self {
        Self {
            entities,
            blobs,
            blob_url_ttl: crate::config::DEFAULT_BLOB_URL_TTL,
        }
    }

    pub fn with_blob_url_ttl(mut self, ttl: Duration) -> Self {
        self.blob_url_ttl = ttl;
        self
    }

    pub fn entity_store(&self) -> &E {
        &self.entities
    }

    pub fn blob_store(&self) -> &B {
        &self.blobs
    }

    /// Verifies both backing stores are reachable.
    pub fn check_health(&self) -> StorageResult<()> {
        health::check_health(&self.entities, &self.blobs)
    }

    // Accounts

    /// Stores a new account and returns its id.
    ///
    /// # Errors
    /// - `AlreadyExists` when another account uses the same email.
    pub fn add_account(&self, account: &Account) -> StorageResult<String> {
        observe("add_account", || {
            require_non_blank("account email", &account.email)?;
            check_profile(&account.profile)?;
            if self.find_account_by_email(&account.email)?.is_some() {
                return Err(StorageError::already_exists(
                    "an account with this email already exists",
                ));
            }

            let id = ids::generate();
            let mut record = account.clone();
            record.id = id.clone();
            record.created_time = now_epoch_ms();
            self.insert(EntityKind::Account, &id, &record)?;
            Ok(id)
        })
    }

    pub fn get_account(&self, account_id: &str) -> StorageResult<Account> {
        observe("get_account", || {
            self.load(EntityKind::Account, account_id)?
                .ok_or_else(|| StorageError::not_found(format!("Account {account_id} not found")))
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> StorageResult<Account> {
        observe("get_account_by_email", || {
            self.find_account_by_email(email)?.ok_or_else(account_email_not_found)
        })
    }

    /// Resolves a bearer token to its owning account id.
    ///
    /// # Errors
    /// - `NotFound` when no key carries this token.
    /// - `Expired` when the key's expiry is in the past.
    pub fn get_account_id_from_access_key(&self, access_key: &str) -> StorageResult<String> {
        observe("get_account_id_from_access_key", || {
            let key: AccessKey = self
                .find_one(EntityKind::AccessKey, &[FieldFilter::eq("name", access_key)])?
                .ok_or_else(|| StorageError::not_found("Access key not found"))?;
            if key.is_expired_at(now_epoch_ms()) {
                return Err(StorageError::expired("Access key has expired"));
            }
            Ok(key.account_id)
        })
    }

    /// Merges `updates` over the account registered under `email`.
    pub fn update_account(&self, email: &str, updates: &AccountUpdate) -> StorageResult<()> {
        observe("update_account", || {
            check_profile(&updates.profile)?;
            let mut document = self
                .find_one_document(EntityKind::Account, &[FieldFilter::eq("email", email)])?
                .ok_or_else(account_email_not_found)?;
            let account_id = document_id(&document)?;

            if let Some(new_email) = updates.email.as_deref() {
                require_non_blank("account email", new_email)?;
                if new_email != email && self.find_account_by_email(new_email)?.is_some() {
                    return Err(StorageError::already_exists(
                        "an account with this email already exists",
                    ));
                }
            }

            merge_documents(&mut document, to_document(updates)?);
            self.entities.put(
                EntityKind::Account,
                &account_id,
                &document,
                WritePrecondition::for_update(updates.expected_version),
            )?;
            Ok(())
        })
    }

    // Apps

    /// Creates an app owned by `account_id`.
    ///
    /// The returned app has `is_current_account` set for the creator.
    pub fn add_app(&self, account_id: &str, app: &App) -> StorageResult<App> {
        observe("add_app", || {
            require_non_blank("app name", &app.name)?;

            let id = ids::generate();
            let mut collaborators = CollaboratorMap::new();
            collaborators.insert(
                account_id.to_string(),
                CollaboratorInfo::new(account_id, Permission::Owner),
            );
            let mut created = App {
                id: id.clone(),
                name: app.name.clone(),
                account_id: account_id.to_string(),
                collaborators,
                created_time: now_epoch_ms(),
                version: 0,
            };
            created.version = self.insert(EntityKind::App, &id, &created)?;
            Ok(created.for_viewer(account_id))
        })
    }

    /// Lists apps whose denormalized owner is `account_id`.
    pub fn get_apps(&self, account_id: &str) -> StorageResult<Vec<App>> {
        observe("get_apps", || {
            let apps: Vec<App> =
                self.find_all(EntityKind::App, &[FieldFilter::eq("accountId", account_id)])?;
            Ok(apps
                .into_iter()
                .map(|app| app.for_viewer(account_id))
                .collect())
        })
    }

    pub fn get_app(&self, account_id: &str, app_id: &str) -> StorageResult<App> {
        observe("get_app", || {
            let (app, _) = self.authorize_app(account_id, app_id)?;
            Ok(app.for_viewer(account_id))
        })
    }

    /// Deletes an app and the deployments filed under it.
    pub fn remove_app(&self, account_id: &str, app_id: &str) -> StorageResult<()> {
        observe("remove_app", || {
            self.authorize_app(account_id, app_id)?;
            let deployment_ids =
                self.ids_matching(EntityKind::Deployment, &[FieldFilter::eq("appId", app_id)])?;
            self.entities
                .delete(EntityKind::Deployment, &deployment_ids)?;
            self.entities
                .delete(EntityKind::App, &[app_id.to_string()])?;
            Ok(())
        })
    }

    pub fn update_app(
        &self,
        account_id: &str,
        app_id: &str,
        update: &AppUpdate,
    ) -> StorageResult<()> {
        observe("update_app", || {
            if let Some(name) = update.name.as_deref() {
                require_non_blank("app name", name)?;
            }
            let (_, mut document) = self.authorize_app(account_id, app_id)?;
            merge_documents(&mut document, to_document(update)?);
            self.entities.put(
                EntityKind::App,
                app_id,
                &document,
                WritePrecondition::for_update(update.expected_version),
            )?;
            Ok(())
        })
    }

    /// Hands ownership of an app to the account registered under `email`.
    ///
    /// The previous owner stays on as a collaborator. Deployments of the app
    /// are re-filed under the new owner.
    pub fn transfer_app(&self, account_id: &str, app_id: &str, email: &str) -> StorageResult<()> {
        observe("transfer_app", || {
            let (mut app, mut document) = self.authorize_app(account_id, app_id)?;
            let target = self
                .find_account_by_email(email)?
                .ok_or_else(account_email_not_found)?;
            if app.owner_id() == Some(target.id.as_str()) {
                return Err(StorageError::already_exists(format!(
                    "account already owns app {app_id}"
                )));
            }

            for info in app.collaborators.values_mut() {
                if info.permission == Permission::Owner {
                    info.permission = Permission::Collaborator;
                }
            }
            app.collaborators.insert(
                target.id.clone(),
                CollaboratorInfo::new(target.id.as_str(), Permission::Owner),
            );

            merge_documents(
                &mut document,
                to_document(&OwnershipPatch {
                    account_id: &target.id,
                    collaborators: &app.collaborators,
                })?,
            );
            self.entities
                .put(EntityKind::App, app_id, &document, WritePrecondition::Any)?;

            let deployments = self.entities.query(
                EntityKind::Deployment,
                &[FieldFilter::eq("appId", app_id)],
                None,
            )?;
            let owner_patch = to_document(&AccountIdPatch {
                account_id: &target.id,
            })?;
            for mut deployment in deployments {
                let deployment_id = document_id(&deployment)?;
                merge_documents(&mut deployment, owner_patch.clone());
                self.entities.put(
                    EntityKind::Deployment,
                    &deployment_id,
                    &deployment,
                    WritePrecondition::Any,
                )?;
            }
            Ok(())
        })
    }

    // Collaborators

    /// Adds the account registered under `email` as a collaborator.
    pub fn add_collaborator(
        &self,
        account_id: &str,
        app_id: &str,
        email: &str,
    ) -> StorageResult<()> {
        observe("add_collaborator", || {
            let (mut app, document) = self.authorize_app(account_id, app_id)?;
            let target = self
                .find_account_by_email(email)?
                .ok_or_else(account_email_not_found)?;
            if app.collaborators.contains_key(&target.id) {
                return Err(StorageError::already_exists(format!(
                    "account is already a collaborator of app {app_id}"
                )));
            }
            app.collaborators.insert(
                target.id.clone(),
                CollaboratorInfo::new(target.id.as_str(), Permission::Collaborator),
            );
            self.write_collaborators(app_id, document, &app.collaborators)
        })
    }

    /// Returns collaborators with `is_current_account` set for the caller.
    pub fn get_collaborators(
        &self,
        account_id: &str,
        app_id: &str,
    ) -> StorageResult<CollaboratorMap> {
        observe("get_collaborators", || {
            let (app, _) = self.authorize_app(account_id, app_id)?;
            let mut collaborators = app.collaborators;
            mark_current_account(&mut collaborators, account_id);
            Ok(collaborators)
        })
    }

    /// Removes a non-owner collaborator.
    ///
    /// # Errors
    /// - `NotFound` when the account is not a collaborator.
    /// - `Other` when the account is the owner; ownership must be transferred
    ///   first.
    pub fn remove_collaborator(
        &self,
        account_id: &str,
        app_id: &str,
        email: &str,
    ) -> StorageResult<()> {
        observe("remove_collaborator", || {
            let (mut app, document) = self.authorize_app(account_id, app_id)?;
            let target = self
                .find_account_by_email(email)?
                .ok_or_else(account_email_not_found)?;
            match app.collaborators.get(&target.id).map(|info| info.permission) {
                None => {
                    return Err(StorageError::not_found(format!(
                        "account is not a collaborator of app {app_id}"
                    )));
                }
                Some(Permission::Owner) => {
                    return Err(StorageError::other(format!(
                        "cannot remove the owner of app {app_id}; transfer ownership first"
                    )));
                }
                Some(Permission::Collaborator) => {}
            }
            app.collaborators.remove(&target.id);
            self.write_collaborators(app_id, document, &app.collaborators)
        })
    }

    // Deployments

    /// Creates a deployment under an accessible app and returns its id.
    ///
    /// A fresh public `key` is assigned alongside the id.
    pub fn add_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment: &Deployment,
    ) -> StorageResult<String> {
        observe("add_deployment", || {
            require_non_blank("deployment name", &deployment.name)?;
            let (app, _) = self.authorize_app(account_id, app_id)?;

            let id = ids::generate();
            let record = Deployment {
                id: id.clone(),
                name: deployment.name.clone(),
                key: ids::generate(),
                app_id: app_id.to_string(),
                account_id: app.account_id,
                package: deployment.package.clone(),
                created_time: now_epoch_ms(),
                version: 0,
            };
            self.insert(EntityKind::Deployment, &id, &record)?;
            Ok(id)
        })
    }

    pub fn get_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<Deployment> {
        observe("get_deployment", || {
            Ok(self
                .authorize_deployment(account_id, app_id, deployment_id)?
                .0)
        })
    }

    /// Resolves a public deployment key without caller authentication.
    pub fn get_deployment_info(&self, deployment_key: &str) -> StorageResult<DeploymentInfo> {
        observe("get_deployment_info", || {
            self.deployment_info(deployment_key)
        })
    }

    pub fn get_deployments(&self, account_id: &str, app_id: &str) -> StorageResult<Vec<Deployment>> {
        observe("get_deployments", || {
            let (app, _) = self.authorize_app(account_id, app_id)?;
            self.find_all(
                EntityKind::Deployment,
                &[
                    FieldFilter::eq("accountId", app.account_id),
                    FieldFilter::eq("appId", app_id),
                ],
            )
        })
    }

    pub fn remove_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<()> {
        observe("remove_deployment", || {
            self.authorize_deployment(account_id, app_id, deployment_id)?;
            self.entities
                .delete(EntityKind::Deployment, &[deployment_id.to_string()])?;
            Ok(())
        })
    }

    pub fn update_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        update: &DeploymentUpdate,
    ) -> StorageResult<()> {
        observe("update_deployment", || {
            if let Some(name) = update.name.as_deref() {
                require_non_blank("deployment name", name)?;
            }
            let (_, mut document) = self.authorize_deployment(account_id, app_id, deployment_id)?;
            merge_documents(&mut document, to_document(update)?);
            self.entities.put(
                EntityKind::Deployment,
                deployment_id,
                &document,
                WritePrecondition::for_update(update.expected_version),
            )?;
            Ok(())
        })
    }

    // Package history

    /// Appends a package to a deployment's release history.
    ///
    /// Not implemented yet; access is still checked first.
    pub fn commit_package(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        _package: &Package,
    ) -> StorageResult<Package> {
        observe("commit_package", || {
            self.authorize_deployment(account_id, app_id, deployment_id)?;
            Err(StorageError::not_implemented("package commit"))
        })
    }

    pub fn clear_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<()> {
        observe("clear_package_history", || {
            self.authorize_deployment(account_id, app_id, deployment_id)?;
            Err(StorageError::not_implemented("package history clearing"))
        })
    }

    pub fn get_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<Vec<Package>> {
        observe("get_package_history", || {
            self.authorize_deployment(account_id, app_id, deployment_id)?;
            Err(StorageError::not_implemented("package history retrieval"))
        })
    }

    pub fn get_package_history_from_deployment_key(
        &self,
        deployment_key: &str,
    ) -> StorageResult<Vec<Package>> {
        observe("get_package_history_from_deployment_key", || {
            self.deployment_info(deployment_key)?;
            Err(StorageError::not_implemented("package history retrieval"))
        })
    }

    pub fn update_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        _history: &[Package],
    ) -> StorageResult<()> {
        observe("update_package_history", || {
            self.authorize_deployment(account_id, app_id, deployment_id)?;
            Err(StorageError::not_implemented("package history update"))
        })
    }

    // Blobs

    /// Streams `reader` into a new blob and returns `blob_id` once durable.
    pub fn add_blob<R: Read>(
        &self,
        blob_id: &str,
        mut reader: R,
        length_hint: Option<u64>,
    ) -> StorageResult<String> {
        observe("add_blob", || {
            self.blobs.upload(blob_id, &mut reader, length_hint)?;
            Ok(blob_id.to_string())
        })
    }

    /// Issues a read URL valid for the configured TTL (one hour by default).
    pub fn get_blob_url(&self, blob_id: &str) -> StorageResult<String> {
        self.get_blob_url_with_ttl(blob_id, self.blob_url_ttl)
    }

    pub fn get_blob_url_with_ttl(&self, blob_id: &str, ttl: Duration) -> StorageResult<String> {
        observe("get_blob_url", || {
            Ok(self.blobs.issue_read_url(blob_id, ttl)?)
        })
    }

    /// Deletes a blob; deleting an absent blob succeeds.
    pub fn remove_blob(&self, blob_id: &str) -> StorageResult<()> {
        observe("remove_blob", || Ok(self.blobs.delete(blob_id)?))
    }

    // Access keys

    /// Stores a new access key for `account_id` and returns its id.
    ///
    /// # Errors
    /// - `AlreadyExists` when the token value is already registered.
    pub fn add_access_key(&self, account_id: &str, access_key: &AccessKey) -> StorageResult<String> {
        observe("add_access_key", || {
            require_non_blank("access key name", &access_key.name)?;
            let existing: Option<AccessKey> = self.find_one(
                EntityKind::AccessKey,
                &[FieldFilter::eq("name", access_key.name.as_str())],
            )?;
            if existing.is_some() {
                return Err(StorageError::already_exists("access key already exists"));
            }

            let id = ids::generate();
            let mut record = access_key.clone();
            record.id = id.clone();
            record.account_id = account_id.to_string();
            record.created_time = now_epoch_ms();
            self.insert(EntityKind::AccessKey, &id, &record)?;
            Ok(id)
        })
    }

    pub fn get_access_key(&self, account_id: &str, access_key_id: &str) -> StorageResult<AccessKey> {
        observe("get_access_key", || {
            Ok(self.authorize_access_key(account_id, access_key_id)?.0)
        })
    }

    pub fn get_access_keys(&self, account_id: &str) -> StorageResult<Vec<AccessKey>> {
        observe("get_access_keys", || {
            self.find_all(
                EntityKind::AccessKey,
                &[FieldFilter::eq("accountId", account_id)],
            )
        })
    }

    pub fn remove_access_key(&self, account_id: &str, access_key_id: &str) -> StorageResult<()> {
        observe("remove_access_key", || {
            self.authorize_access_key(account_id, access_key_id)?;
            self.entities
                .delete(EntityKind::AccessKey, &[access_key_id.to_string()])?;
            Ok(())
        })
    }

    pub fn update_access_key(
        &self,
        account_id: &str,
        access_key_id: &str,
        update: &AccessKeyUpdate,
    ) -> StorageResult<()> {
        observe("update_access_key", || {
            let (_, mut document) = self.authorize_access_key(account_id, access_key_id)?;
            merge_documents(&mut document, to_document(update)?);
            self.entities.put(
                EntityKind::AccessKey,
                access_key_id,
                &document,
                WritePrecondition::for_update(update.expected_version),
            )?;
            Ok(())
        })
    }

    /// Deletes every entity of every kind. Not transactional.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn drop_all(&self) -> StorageResult<()> {
        let results: Vec<crate::error::BackendResult<usize>> = std::thread::scope(|scope| {
            let workers: Vec<_> = EntityKind::ALL
                .iter()
                .map(|&kind| {
                    scope.spawn(move || {
                        let ids = self.entities.keys(kind)?;
                        self.entities.delete(kind, &ids)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| {
                    worker.join().unwrap_or_else(|_| {
                        Err(crate::error::BackendError::other("drop_all worker panicked"))
                    })
                })
                .collect()
        });

        for result in results {
            result?;
        }
        Ok(())
    }

    fn authorize_app(&self, account_id: &str, app_id: &str) -> StorageResult<(App, Document)> {
        let not_found = || StorageError::not_found(format!("App {app_id} not found"));
        let document = self
            .entities
            .get(EntityKind::App, app_id)?
            .ok_or_else(not_found)?;
        let app: App = from_document(document.clone())?;
        if !app.is_accessible_by(account_id) {
            return Err(not_found());
        }
        Ok((app, document))
    }

    fn authorize_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StorageResult<(Deployment, Document)> {
        let not_found =
            || StorageError::not_found(format!("Deployment {deployment_id} not found"));
        let (app, _) = self.authorize_app(account_id, app_id)?;
        let document = self
            .entities
            .get(EntityKind::Deployment, deployment_id)?
            .ok_or_else(not_found)?;
        let deployment: Deployment = from_document(document.clone())?;
        if deployment.app_id != app_id || deployment.account_id != app.account_id {
            return Err(not_found());
        }
        Ok((deployment, document))
    }

    fn authorize_access_key(
        &self,
        account_id: &str,
        access_key_id: &str,
    ) -> StorageResult<(AccessKey, Document)> {
        let not_found =
            || StorageError::not_found(format!("Access key {access_key_id} not found"));
        let document = self
            .entities
            .get(EntityKind::AccessKey, access_key_id)?
            .ok_or_else(not_found)?;
        let access_key: AccessKey = from_document(document.clone())?;
        if access_key.account_id != account_id {
            return Err(not_found());
        }
        Ok((access_key, document))
    }

    fn deployment_info(&self, deployment_key: &str) -> StorageResult<DeploymentInfo> {
        let deployment: Deployment = self
            .find_one(EntityKind::Deployment, &[FieldFilter::eq("key", deployment_key)])?
            .ok_or_else(|| StorageError::not_found("Deployment with this key not found"))?;
        Ok(DeploymentInfo {
            app_id: deployment.app_id,
            deployment_id: deployment.id,
        })
    }

    fn write_collaborators(
        &self,
        app_id: &str,
        mut document: Document,
        collaborators: &CollaboratorMap,
    ) -> StorageResult<()> {
        merge_documents(
            &mut document,
            to_document(&CollaboratorsPatch { collaborators })?,
        );
        self.entities
            .put(EntityKind::App, app_id, &document, WritePrecondition::Any)?;
        Ok(())
    }

    fn find_account_by_email(&self, email: &str) -> StorageResult<Option<Account>> {
        self.find_one(EntityKind::Account, &[FieldFilter::eq("email", email)])
    }

    fn insert<T: Serialize>(&self, kind: EntityKind, id: &str, record: &T) -> StorageResult<u64> {
        let document = to_document(record)?;
        Ok(self
            .entities
            .put(kind, id, &document, WritePrecondition::Absent)?)
    }

    fn load<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> StorageResult<Option<T>> {
        match self.entities.get(kind, id)? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    fn find_one_document(
        &self,
        kind: EntityKind,
        filters: &[FieldFilter],
    ) -> StorageResult<Option<Document>> {
        Ok(self.entities.query(kind, filters, Some(1))?.into_iter().next())
    }

    fn find_one<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        filters: &[FieldFilter],
    ) -> StorageResult<Option<T>> {
        match self.find_one_document(kind, filters)? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    fn find_all<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        filters: &[FieldFilter],
    ) -> StorageResult<Vec<T>> {
        let documents = self.entities.query(kind, filters, None)?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            records.push(from_document(document)?);
        }
        Ok(records)
    }

    fn ids_matching(&self, kind: EntityKind, filters: &[FieldFilter]) -> StorageResult<Vec<String>> {
        self.entities
            .query(kind, filters, None)?
            .iter()
            .map(document_id)
            .collect()
    }
}

fn observe<T>(op: &'static str, run: impl FnOnce() -> StorageResult<T>) -> StorageResult<T> {
    let started_at = Instant::now();
    let result = run();
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => debug!(
            "event=storage_op module=storage status=ok op={} duration_ms={}",
            op, duration_ms
        ),
        Err(err) if matches!(err.kind, ErrorKind::NotFound | ErrorKind::Expired) => debug!(
            "event=storage_op module=storage status=error op={} duration_ms={} error_kind={}",
            op, duration_ms, err.kind
        ),
        Err(err) => warn!(
            "event=storage_op module=storage status=error op={} duration_ms={} error_kind={}",
            op, duration_ms, err.kind
        ),
    }
    result
}

fn document_id(document: &Document) -> StorageResult<String> {
    string_field(document, "id")
        .map(str::to_string)
        .ok_or_else(|| StorageError::other("stored document is missing its id"))
}

fn account_email_not_found() -> StorageError {
    StorageError::not_found("Account with this email not found")
}

fn check_profile(profile: &Document) -> StorageResult<()> {
    match reserved_profile_key(profile) {
        Some(key) => Err(StorageError::other(format!(
            "profile field `{key}` is reserved"
        ))),
        None => Ok(()),
    }
}

fn require_non_blank(field: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::other(format!("{field} must not be blank")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Storage;
    use crate::document::EntityKind;
    use crate::model::account::Account;
    use crate::model::app::App;
    use crate::repo::blob_store::FsBlobStore;
    use crate::repo::entity_store::{EntityStore, SqliteEntityStore};

    #[test]
    fn drop_all_clears_every_kind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(
            SqliteEntityStore::open_in_memory().unwrap(),
            FsBlobStore::open(dir.path(), "bucket", None, None).unwrap(),
        );
        let account_id = storage
            .add_account(&Account::new("u@x.com", "User"))
            .unwrap();
        storage.add_app(&account_id, &App::new("demo")).unwrap();

        storage.drop_all().unwrap();
        for kind in EntityKind::ALL {
            assert!(storage.entity_store().keys(kind).unwrap().is_empty());
        }
    }
}
