//! Copying every file of one vault into another.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::INDEX_PATH;
use crate::operations::{fresh_id, open_file_blob, wrap_file_key};
use crate::session::Session;
use nexusvault_common::{Error, Result, SensitiveBytes, VaultOwner};
use nexusvault_crypto::{encrypt_with_key, generate_file_key};
use nexusvault_storage::{BlobMap, BlobStore, RemoteResolver};

/// Outcome of [`transfer_vault`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub files: usize,
    pub commit: String,
}

/// Copy every file from `source`'s vault into `dest`'s vault.
///
/// Each file is decrypted under the source password and re-encrypted with
/// a fresh file key wrapped under the destination password. New storage
/// ids avoid every id used by either vault. Destination files are kept;
/// the transferred files are added to its index.
///
/// # Postconditions
/// - The destination gains every source file in one commit
/// - The source vault is not modified
///
/// # Errors
/// - `Authentication` if either password is wrong
/// - `Validation` if the source vault holds no files
/// - `Conflict` if a source path already exists in the destination
/// - Backend errors from the fetches or the push
pub async fn transfer_vault(
    store: &dyn BlobStore,
    resolver: &RemoteResolver,
    source: VaultOwner,
    source_password: SensitiveBytes,
    dest: VaultOwner,
    dest_password: SensitiveBytes,
) -> Result<TransferReport> {
    if source == dest {
        return Err(Error::Validation(
            "Source and destination vaults are the same".to_string(),
        ));
    }

    let source = Session::connect(store, source, source_password).await?;
    let records = source.index().files()?;
    if records.is_empty() {
        return Err(Error::Validation(format!(
            "The vault of {} holds no files",
            source.owner()
        )));
    }

    let dest = Session::connect(store, dest, dest_password).await?;
    for record in &records {
        if dest.index().contains(&record.path) {
            return Err(Error::Conflict(format!(
                "{} already exists in the vault of {}",
                record.path,
                dest.owner()
            )));
        }
    }

    let mut taken: BTreeSet<String> = source.index().storage_ids();
    taken.extend(dest.index().storage_ids());

    let kdf = dest.settings().kdf_params;
    let mut next = dest.index().clone();
    let mut blobs = BlobMap::new();

    for record in &records {
        let blob = store.fetch_raw(source.owner(), &record.storage_id).await?;
        let content =
            open_file_blob(blob, record.file_key.clone(), source.password().clone()).await?;

        let storage_id = fresh_id(dest.settings().file_id_bytes(), &taken);
        taken.insert(storage_id.clone());

        let key = generate_file_key();
        blobs.insert(storage_id.clone(), encrypt_with_key(&content, &key)?);
        next.add_file(
            &record.path,
            storage_id,
            wrap_file_key(&key, dest.password().as_bytes(), &kdf)?,
        )?;
        debug!(path = %record.path, "file staged for transfer");
    }
    blobs.insert(
        INDEX_PATH.to_string(),
        next.seal(dest.password().as_bytes(), &kdf)?,
    );

    let outcome = store
        .push_atomic(
            &dest.remote(resolver),
            &dest.credentials(),
            dest.head(),
            blobs,
            &dest
                .settings()
                .commit(&format!("Vault Transfer from {}", source.owner())),
        )
        .await?;

    info!(
        source = %source.owner(),
        dest = %dest.owner(),
        files = records.len(),
        "vault transferred"
    );
    Ok(TransferReport {
        files: records.len(),
        commit: outcome.commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{unwrap_file_key, VaultOperations};
    use crate::test_support::{new_vault, owner, VAULT_PASSWORD};
    use nexusvault_common::VaultPath;
    use nexusvault_storage::MemoryStore;

    fn p(path: &str) -> VaultPath {
        VaultPath::parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_transfer_copies_every_file() {
        let store = MemoryStore::new();
        let mut alice = new_vault(&store, "alice").await;
        let mut bob = new_vault(&store, "bob").await;

        let mut ops = VaultOperations::new(&mut alice, &store, store.resolver());
        ops.upload(&p("a.txt"), b"alpha", false).await.unwrap();
        ops.upload(&p("deep/b.txt"), b"beta", false).await.unwrap();
        let source_ids = alice.index().storage_ids();

        let mut ops = VaultOperations::new(&mut bob, &store, store.resolver());
        ops.upload(&p("mine.txt"), b"bob's", false).await.unwrap();

        let report = transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            VAULT_PASSWORD.into(),
        )
        .await
        .unwrap();
        assert_eq!(report.files, 2);

        let mut bob = Session::connect(&store, owner("bob"), VAULT_PASSWORD.into())
            .await
            .unwrap();
        assert!(bob.index().storage_ids().is_disjoint(&source_ids));
        for path in ["a.txt", "deep/b.txt"] {
            let source_key = unwrap_file_key(
                &alice.index().find_file(&p(path)).unwrap().file_key,
                VAULT_PASSWORD.as_bytes(),
            )
            .unwrap();
            let dest_key = unwrap_file_key(
                &bob.index().find_file(&p(path)).unwrap().file_key,
                VAULT_PASSWORD.as_bytes(),
            )
            .unwrap();
            assert_ne!(source_key.as_bytes(), dest_key.as_bytes());
        }

        let ops = VaultOperations::new(&mut bob, &store, store.resolver());
        assert_eq!(ops.read_file(&p("a.txt")).await.unwrap(), b"alpha");
        assert_eq!(ops.read_file(&p("deep/b.txt")).await.unwrap(), b"beta");
        assert_eq!(ops.read_file(&p("mine.txt")).await.unwrap(), b"bob's");

        let remote = bob.remote(store.resolver());
        assert_eq!(
            store.head_message(&remote).unwrap().as_deref(),
            Some("Nexus: Vault Transfer from alice")
        );
    }

    #[tokio::test]
    async fn test_transfer_from_empty_vault_fails() {
        let store = MemoryStore::new();
        let _alice = new_vault(&store, "alice").await;
        let _bob = new_vault(&store, "bob").await;

        let result = transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            VAULT_PASSWORD.into(),
        )
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_transfer_wrong_destination_password() {
        let store = MemoryStore::new();
        let mut alice = new_vault(&store, "alice").await;
        let _bob = new_vault(&store, "bob").await;
        VaultOperations::new(&mut alice, &store, store.resolver())
            .upload(&p("a"), b"a", false)
            .await
            .unwrap();

        let result = transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            "wrong".into(),
        )
        .await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_transfer_path_collision_conflicts() {
        let store = MemoryStore::new();
        let mut alice = new_vault(&store, "alice").await;
        let mut bob = new_vault(&store, "bob").await;
        VaultOperations::new(&mut alice, &store, store.resolver())
            .upload(&p("same.txt"), b"a", false)
            .await
            .unwrap();
        VaultOperations::new(&mut bob, &store, store.resolver())
            .upload(&p("same.txt"), b"b", false)
            .await
            .unwrap();
        let remote = bob.remote(store.resolver());
        let commits = store.commit_count(&remote).unwrap();

        let result = transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            VAULT_PASSWORD.into(),
        )
        .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.commit_count(&remote).unwrap(), commits);
    }

    #[tokio::test]
    async fn test_unreadable_source_file_aborts_before_push() {
        let store = MemoryStore::new();
        let mut alice = new_vault(&store, "alice").await;
        let bob = new_vault(&store, "bob").await;

        let mut ops = VaultOperations::new(&mut alice, &store, store.resolver());
        ops.upload(&p("a.txt"), b"alpha", false).await.unwrap();
        let broken = ops.upload(&p("b.txt"), b"beta", false).await.unwrap();

        let mut garbage = BlobMap::new();
        garbage.insert(broken.storage_id, vec![0u8; 48]);
        store
            .push_atomic(
                &alice.remote(store.resolver()),
                &alice.credentials(),
                alice.head(),
                garbage,
                &alice.settings().commit("corrupt"),
            )
            .await
            .unwrap();

        let remote = bob.remote(store.resolver());
        let commits = store.commit_count(&remote).unwrap();
        let head = store.head_snapshot(&remote).unwrap();

        let result = transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            VAULT_PASSWORD.into(),
        )
        .await;
        assert!(matches!(result, Err(Error::DecryptionFailed)));
        assert_eq!(store.commit_count(&remote).unwrap(), commits);
        assert_eq!(store.head_snapshot(&remote).unwrap(), head);
    }

    #[tokio::test]
    async fn test_session_from_before_transfer_cannot_overwrite_it() {
        let store = MemoryStore::new();
        let mut alice = new_vault(&store, "alice").await;
        let mut bob = new_vault(&store, "bob").await;
        VaultOperations::new(&mut alice, &store, store.resolver())
            .upload(&p("a.txt"), b"alpha", false)
            .await
            .unwrap();

        transfer_vault(
            &store,
            store.resolver(),
            owner("alice"),
            VAULT_PASSWORD.into(),
            owner("bob"),
            VAULT_PASSWORD.into(),
        )
        .await
        .unwrap();

        let mut stale = VaultOperations::new(&mut bob, &store, store.resolver());
        let result = stale.upload(&p("mine.txt"), b"bob's", false).await;
        assert!(matches!(result, Err(Error::PushRejected(_))));
        assert!(!stale.session().index().contains(&p("mine.txt")));

        let remote = bob.remote(store.resolver());
        let head = store.head_snapshot(&remote).unwrap().unwrap();
        let index = crate::index::VaultIndex::open(&head[INDEX_PATH], VAULT_PASSWORD.as_bytes())
            .unwrap();
        assert!(index.contains(&p("a.txt")));

        let mut fresh = Session::connect(&store, owner("bob"), VAULT_PASSWORD.into())
            .await
            .unwrap();
        let mut ops = VaultOperations::new(&mut fresh, &store, store.resolver());
        ops.upload(&p("mine.txt"), b"bob's", false).await.unwrap();
        assert_eq!(ops.read_file(&p("a.txt")).await.unwrap(), b"alpha");
        assert_eq!(ops.read_file(&p("mine.txt")).await.unwrap(), b"bob's");
    }
}
