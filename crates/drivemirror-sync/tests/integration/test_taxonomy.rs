//! Folder layout creation on a single account

use drivemirror_core::domain::{AccountId, Category};

use crate::common::{access_token, Harness, ROOT, ROOT_FOLDER};

const EMAIL: &str = "owner@example.com";

#[tokio::test]
async fn test_creates_root_and_every_category() {
    let h = Harness::new().await;

    let hierarchy = h
        .services
        .taxonomy
        .ensure_hierarchy(&AccountId::new(), &access_token(EMAIL))
        .await
        .unwrap();

    let roots = h.drive.folders_named(EMAIL, ROOT_FOLDER, ROOT);
    assert_eq!(roots, vec![hierarchy.root_id.to_string()]);

    for category in Category::ALL {
        let id = hierarchy.folder_for(category).unwrap();
        let found = h
            .drive
            .folders_named(EMAIL, category.folder_name(), hierarchy.root_id.as_str());
        assert_eq!(found, vec![id.to_string()], "{category}");
    }
    assert_eq!(h.drive.writes(EMAIL), 1 + Category::ALL.len());
}

#[tokio::test]
async fn test_second_run_creates_nothing() {
    let h = Harness::new().await;
    let owner = AccountId::new();
    let token = access_token(EMAIL);

    let first = h.services.taxonomy.ensure_hierarchy(&owner, &token).await.unwrap();
    h.drive.reset_counters();
    let second = h.services.taxonomy.ensure_hierarchy(&owner, &token).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.drive.writes(EMAIL), 0);
}

#[tokio::test]
async fn test_completes_partial_layout() {
    let h = Harness::new().await;
    let root = h.drive.seed_folder(EMAIL, ROOT_FOLDER, ROOT);
    let manual = h.drive.seed_folder(EMAIL, "Manual", &root);

    let hierarchy = h
        .services
        .taxonomy
        .ensure_hierarchy(&AccountId::new(), &access_token(EMAIL))
        .await
        .unwrap();

    assert_eq!(hierarchy.root_id.as_str(), root);
    assert_eq!(hierarchy.folder_for(Category::Manual).unwrap().as_str(), manual);
    assert_eq!(h.drive.writes(EMAIL), Category::ALL.len() - 1);
}

#[tokio::test]
async fn test_ignores_same_named_folders_elsewhere() {
    let h = Harness::new().await;
    // A category-named folder at the top level and an application-named
    // folder nested somewhere else must not be adopted
    let stray_manual = h.drive.seed_folder(EMAIL, "Manual", ROOT);
    let archive = h.drive.seed_folder(EMAIL, "Archive", ROOT);
    let nested_root = h.drive.seed_folder(EMAIL, ROOT_FOLDER, &archive);

    let hierarchy = h
        .services
        .taxonomy
        .ensure_hierarchy(&AccountId::new(), &access_token(EMAIL))
        .await
        .unwrap();

    assert_ne!(hierarchy.root_id.as_str(), nested_root);
    assert_eq!(
        h.drive.folders_named(EMAIL, ROOT_FOLDER, ROOT),
        vec![hierarchy.root_id.to_string()]
    );
    let manual = hierarchy.folder_for(Category::Manual).unwrap();
    assert_ne!(manual.as_str(), stray_manual);
    assert_eq!(
        h.drive.folder_path(EMAIL, manual.as_str()),
        vec![ROOT_FOLDER.to_string()]
    );
}

#[tokio::test]
async fn test_files_named_like_folders_are_not_folders() {
    let h = Harness::new().await;
    let root = h.drive.seed_folder(EMAIL, ROOT_FOLDER, ROOT);
    h.drive.seed_file(EMAIL, "Manual", b"not a folder", &root);

    let hierarchy = h
        .services
        .taxonomy
        .ensure_hierarchy(&AccountId::new(), &access_token(EMAIL))
        .await
        .unwrap();

    let manual = hierarchy.folder_for(Category::Manual).unwrap();
    assert!(h.drive.get(EMAIL, manual.as_str()).unwrap().is_folder());
}

#[tokio::test]
async fn test_concurrent_runs_create_one_layout() {
    let h = Harness::new().await;
    h.drive.yield_after_listing();
    let owner = AccountId::new();
    let token = access_token(EMAIL);
    let taxonomy = &h.services.taxonomy;

    let (first, second) = tokio::join!(
        taxonomy.ensure_hierarchy(&owner, &token),
        taxonomy.ensure_hierarchy(&owner, &token),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first, second);
    assert_eq!(
        h.drive.folders_named(EMAIL, ROOT_FOLDER, ROOT),
        vec![first.root_id.to_string()]
    );
    for category in Category::ALL {
        let found = h
            .drive
            .folders_named(EMAIL, category.folder_name(), first.root_id.as_str());
        assert_eq!(found.len(), 1, "{category}");
    }
    assert_eq!(h.drive.writes(EMAIL), 1 + Category::ALL.len());
}
