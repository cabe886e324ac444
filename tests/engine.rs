// ABOUTME: Integration tests for the image engine façade over a fake transport.
// ABOUTME: Covers tag parsing, delete aggregation, inspect errors, load/import and reports.

mod support;

use picha::engine::{
    ChangeKind, DeleteOptions, EngineError, EngineErrorKind, ImportOptions, InspectOptions,
    ListOptions, LoadOptions, PruneOptions,
};
use picha::runtime::wire::{ChangeRecord, DeleteRecord, HistoryRecord, ImageRecord, PruneRecord, SearchRecord};
use picha::runtime::{Filters, PullOptions, PushOptions, SearchOptions};
use picha::types::ImageRef;
use proptest::prelude::*;
use support::{Call, FakeTransport, details, engine};
use tokio_util::sync::CancellationToken;

fn refs(names: &[&str]) -> Vec<ImageRef> {
    names.iter().map(|n| ImageRef::from(*n)).collect()
}

fn tags(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|t| t.to_string()).collect()
}

mod tag {
    use super::*;

    #[tokio::test]
    async fn splits_each_tag_into_repo_and_tag() {
        support::init_tracing();
        let engine = engine(FakeTransport::new());

        engine
            .tag(
                &ImageRef::from("img1"),
                &tags(&["quay.io/x/y:v2", "localhost/z"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            engine.transport().calls(),
            vec![
                Call::Tag {
                    name: "img1".into(),
                    tag: "v2".into(),
                    repo: "quay.io/x/y".into()
                },
                Call::Tag {
                    name: "img1".into(),
                    tag: "".into(),
                    repo: "localhost/z".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn tag_without_name_makes_no_calls() {
        let engine = engine(FakeTransport::new());

        let err = engine
            .tag(&ImageRef::from("img1"), &tags(&[":badtag"]), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid image name"));
        assert_eq!(err.kind(), EngineErrorKind::Validation);
        assert!(engine.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_invalid_tag() {
        let engine = engine(FakeTransport::new());

        let err = engine
            .tag(
                &ImageRef::from("img1"),
                &tags(&["app:v1", "Bad Name", "app:v2"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidReference { .. }));
        assert_eq!(engine.transport().calls().len(), 1);
    }

    #[tokio::test]
    async fn stops_at_first_transport_failure() {
        let fake = FakeTransport {
            reject_repo: Some("blocked".to_string()),
            ..Default::default()
        };
        let engine = engine(fake);

        let err = engine
            .tag(
                &ImageRef::from("img1"),
                &tags(&["blocked:v1", "app:v2"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), EngineErrorKind::Transport);
        assert_eq!(engine.transport().calls().len(), 1);
    }

    #[tokio::test]
    async fn untag_uses_the_same_rules() {
        let engine = engine(FakeTransport::new());
        let cancel = CancellationToken::new();

        engine
            .untag(&ImageRef::from("img1"), &tags(&["registry:5000/team/app:rc1"]), &cancel)
            .await
            .unwrap();
        let err = engine
            .untag(&ImageRef::from("img1"), &tags(&[":rc1"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidImageName(_)));
        assert_eq!(
            engine.transport().calls(),
            vec![Call::Untag {
                name: "img1".into(),
                tag: "rc1".into(),
                repo: "registry:5000/team/app".into()
            }]
        );
    }

    #[tokio::test]
    async fn cancelled_token_prevents_calls() {
        let engine = engine(FakeTransport::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .tag(&ImageRef::from("img1"), &tags(&["app:v1"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert!(engine.transport().calls().is_empty());
    }

    proptest! {
        #[test]
        fn one_call_per_named_tag(
            repo in "[a-z][a-z0-9]{0,8}(/[a-z][a-z0-9]{0,8}){0,2}",
            tag in proptest::option::of("[a-z0-9][a-z0-9._-]{0,10}"),
        ) {
            let raw = match &tag {
                Some(t) => format!("{repo}:{t}"),
                None => repo.clone(),
            };
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let engine = engine(FakeTransport::new());

            runtime
                .block_on(engine.tag(&ImageRef::from("img"), &[raw], &CancellationToken::new()))
                .unwrap();

            prop_assert_eq!(
                engine.transport().calls(),
                vec![Call::Tag {
                    name: "img".into(),
                    tag: tag.unwrap_or_default(),
                    repo,
                }]
            );
        }

        #[test]
        fn nameless_tags_never_reach_the_transport(tag in "[a-z0-9][a-z0-9._-]{0,10}") {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let engine = engine(FakeTransport::new());

            let result = runtime.block_on(engine.tag(
                &ImageRef::from("img"),
                &[format!(":{tag}")],
                &CancellationToken::new(),
            ));

            prop_assert!(matches!(result, Err(EngineError::InvalidImageName(_))));
            prop_assert!(engine.transport().calls().is_empty());
        }
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn aggregates_records_in_input_order() {
        let fake = FakeTransport::new()
            .with_removal("a", vec![DeleteRecord::deleted("a")])
            .with_removal("b", vec![DeleteRecord::untagged("b:latest")]);
        let engine = engine(fake);

        let report = engine
            .delete(&refs(&["a", "b"]), &DeleteOptions { force: true }, &CancellationToken::new())
            .await
            .unwrap();

        let deleted: Vec<_> = report.deleted.iter().map(|id| id.as_str()).collect();
        assert_eq!(deleted, ["a"]);
        assert_eq!(report.untagged, ["b:latest"]);
        assert_eq!(
            engine.transport().calls(),
            vec![
                Call::Remove { name: "a".into(), force: true },
                Call::Remove { name: "b".into(), force: true },
            ]
        );
    }

    #[tokio::test]
    async fn concatenates_multi_record_responses() {
        let fake = FakeTransport::new()
            .with_removal(
                "web",
                vec![
                    DeleteRecord::untagged("web:1"),
                    DeleteRecord::untagged("web:2"),
                    DeleteRecord::deleted("sha256:aaa"),
                    DeleteRecord::deleted("sha256:bbb"),
                ],
            )
            .with_removal("db", vec![DeleteRecord::deleted("sha256:ccc")]);
        let engine = engine(fake);

        let report = engine
            .delete(&refs(&["web", "db"]), &DeleteOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let deleted: Vec<_> = report.deleted.iter().map(|id| id.as_str()).collect();
        assert_eq!(deleted, ["sha256:aaa", "sha256:bbb", "sha256:ccc"]);
        assert_eq!(report.untagged, ["web:1", "web:2"]);
    }

    #[tokio::test]
    async fn first_failure_aborts() {
        let fake = FakeTransport::new()
            .with_removal("a", vec![DeleteRecord::deleted("a")])
            .with_removal("c", vec![DeleteRecord::deleted("c")]);
        let engine = engine(fake);

        let err = engine
            .delete(&refs(&["a", "missing", "c"]), &DeleteOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(engine.transport().calls().len(), 2);
    }
}

mod inspect {
    use super::*;

    #[tokio::test]
    async fn collects_per_image_errors() {
        let fake = FakeTransport::new().with_image("good", details("sha256:good", &["good:latest"]));
        let engine = engine(fake);

        let report = engine
            .inspect(&refs(&["good", "bad"]), &InspectOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.images.len(), 2);
        let good = report.images[0].as_ref().unwrap();
        assert_eq!(good.id.as_str(), "sha256:good");
        assert_eq!(good.names, ["good:latest"]);
        assert!(report.images[1].is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors["bad"].contains("not found"));
        assert_eq!(report.found().count(), 1);
    }

    #[tokio::test]
    async fn unreadable_record_is_a_per_image_error() {
        let mut odd = details("sha256:odd", &["odd:latest"]);
        odd.created = Some(String::new());
        let fake = FakeTransport::new()
            .with_image("good", details("sha256:good", &["good:latest"]))
            .with_image("odd", odd);
        let engine = engine(fake);

        let report = engine
            .inspect(&refs(&["good", "odd"]), &InspectOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.images[0].is_some());
        assert!(report.images[1].is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors.contains_key("odd"));
    }

    #[tokio::test]
    async fn forwards_size_flag() {
        let engine = engine(FakeTransport::new().with_image("app", details("sha256:1", &[])));

        engine
            .inspect(&refs(&["app"]), &InspectOptions { size: true }, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            engine.transport().calls(),
            vec![Call::GetImage { name: "app".into(), with_size: true }]
        );
    }

    #[tokio::test]
    async fn unreachable_service_fails_the_call() {
        let fake = FakeTransport {
            unreachable: true,
            ..Default::default()
        };
        let engine = engine(fake);

        let err = engine
            .inspect(&refs(&["app"]), &InspectOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), EngineErrorKind::Transport);
    }

    #[tokio::test]
    async fn report_serializes_missing_images_as_null() {
        let engine = engine(FakeTransport::new());

        let report = engine
            .inspect(&refs(&["ghost"]), &InspectOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["images"][0].is_null());
        assert!(json["errors"]["ghost"].is_string());
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn exists_is_false_for_missing_images() {
        let engine = engine(FakeTransport::new().with_image("app", details("sha256:1", &[])));
        let cancel = CancellationToken::new();

        assert!(engine.exists(&ImageRef::from("app"), &cancel).await.unwrap());
        assert!(!engine.exists(&ImageRef::from("other"), &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn exists_surfaces_transport_failures() {
        let engine = engine(FakeTransport {
            unreachable: true,
            ..Default::default()
        });

        let err = engine
            .exists(&ImageRef::from("app"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn list_forwards_filters_and_projects_rows() {
        let fake = FakeTransport {
            rows: vec![ImageRecord {
                id: "sha256:abc".to_string(),
                names: vec!["alpine:3.19".to_string()],
                created_at: 1_700_000_000,
                size: 7_300_000,
                ..Default::default()
            }],
            ..Default::default()
        };
        let engine = engine(fake);
        let filters = Filters::from([("dangling".to_string(), vec!["false".to_string()])]);

        let rows = engine
            .list(
                &ListOptions {
                    all: true,
                    filters: filters.clone(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].names, ["alpine:3.19"]);
        assert_eq!(rows[0].created_at.timestamp(), 1_700_000_000);
        assert_eq!(engine.transport().calls(), vec![Call::List { all: true, filters }]);
    }

    #[tokio::test]
    async fn mutating_a_report_does_not_leak_into_later_calls() {
        let fake = FakeTransport {
            rows: vec![ImageRecord {
                id: "sha256:abc".to_string(),
                names: vec!["alpine:3.19".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let engine = engine(fake);
        let cancel = CancellationToken::new();

        let mut first = engine.list(&ListOptions::default(), &cancel).await.unwrap();
        first[0].names.push("mutated".to_string());
        first[0].labels.insert("k".to_string(), "v".to_string());

        let second = engine.list(&ListOptions::default(), &cancel).await.unwrap();
        assert_eq!(second[0].names, ["alpine:3.19"]);
        assert!(second[0].labels.is_empty());
    }

    #[tokio::test]
    async fn history_preserves_service_order() {
        let history = ["sha256:top", "sha256:mid", "<missing>"]
            .iter()
            .enumerate()
            .map(|(i, id)| HistoryRecord {
                id: id.to_string(),
                created_at: 1_700_000_000 - i as i64,
                created_by: format!("step {i}"),
                ..Default::default()
            })
            .collect();
        let engine = engine(FakeTransport {
            history,
            ..Default::default()
        });

        let report = engine
            .history(&ImageRef::from("app"), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = report.layers.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["sha256:top", "sha256:mid", "<missing>"]);
        assert_eq!(report.layers[2].created_by, "step 2");
    }

    #[tokio::test]
    async fn pull_reports_names() {
        let engine = engine(FakeTransport::new());

        let report = engine
            .pull(&ImageRef::from("alpine"), &PullOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.names, ["docker.io/library/alpine"]);
    }

    #[tokio::test]
    async fn push_forwards_source_and_destination() {
        let engine = engine(FakeTransport::new());

        engine
            .push(
                &ImageRef::from("app:v1"),
                "registry.example.com/app:v1",
                &PushOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            engine.transport().calls(),
            vec![Call::Push {
                source: "app:v1".into(),
                destination: "registry.example.com/app:v1".into()
            }]
        );
    }

    #[tokio::test]
    async fn prune_reports_ids_and_reclaimed_space() {
        let engine = engine(FakeTransport {
            pruned: PruneRecord {
                deleted: vec![
                    DeleteRecord::untagged("old:1"),
                    DeleteRecord::deleted("sha256:old"),
                ],
                space_reclaimed: 4096,
            },
            ..Default::default()
        });

        let report = engine
            .prune(&PruneOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = report.pruned_ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["sha256:old"]);
        assert_eq!(report.size, 4096);
    }

    #[tokio::test]
    async fn diff_decodes_change_kinds() {
        let engine = engine(FakeTransport {
            changes: vec![
                ChangeRecord { path: "/etc/motd".into(), kind: 0 },
                ChangeRecord { path: "/opt/app".into(), kind: 1 },
                ChangeRecord { path: "/tmp/cache".into(), kind: 2 },
            ],
            ..Default::default()
        });

        let report = engine
            .diff(&ImageRef::from("app"), &CancellationToken::new())
            .await
            .unwrap();

        let kinds: Vec<_> = report.changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [ChangeKind::Modified, ChangeKind::Added, ChangeKind::Deleted]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["changes"][1]["kind"], "A");
    }

    #[tokio::test]
    async fn diff_rejects_unknown_kinds() {
        let engine = engine(FakeTransport {
            changes: vec![ChangeRecord { path: "/x".into(), kind: 9 }],
            ..Default::default()
        });

        let err = engine
            .diff(&ImageRef::from("app"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Projection { .. }));
    }

    #[tokio::test]
    async fn search_applies_configured_limit() {
        let engine = engine(FakeTransport {
            search_rows: vec![SearchRecord {
                name: "library/alpine".into(),
                stars: 10_000,
                official: true,
                ..Default::default()
            }],
            ..Default::default()
        });
        let cancel = CancellationToken::new();

        let rows = engine.search("alpine", &SearchOptions::default(), &cancel).await.unwrap();
        let explicit = SearchOptions {
            limit: Some(3),
            ..Default::default()
        };
        engine.search("alpine", &explicit, &cancel).await.unwrap();

        assert_eq!(rows[0].name, "library/alpine");
        assert!(rows[0].official);
        assert_eq!(
            engine.transport().calls(),
            vec![
                Call::Search { term: "alpine".into(), limit: Some(25) },
                Call::Search { term: "alpine".into(), limit: Some(3) },
            ]
        );
    }

    #[tokio::test]
    async fn config_is_served_without_the_transport() {
        let engine = engine(FakeTransport::new());

        let config = engine.config();

        assert_eq!(config.images.search_limit, 25);
        assert!(engine.transport().calls().is_empty());
    }
}

mod load_import {
    use super::*;

    #[tokio::test]
    async fn load_streams_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("image.tar");
        std::fs::write(&input, support::tar_of(&[("manifest.json", b"[]")])).unwrap();
        let engine = engine(FakeTransport::new());

        let report = engine
            .load(
                &LoadOptions {
                    input: input.clone(),
                    name: Some("app:v1".to_string()),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.names, ["localhost/loaded:latest", "app:v1"]);
        let size = std::fs::metadata(&input).unwrap().len() as usize;
        assert_eq!(
            engine.transport().calls(),
            vec![Call::Load { name: Some("app:v1".into()), bytes: size }]
        );
    }

    #[tokio::test]
    async fn load_of_missing_file_is_local_io() {
        let engine = engine(FakeTransport::new());

        let err = engine
            .load(
                &LoadOptions {
                    input: "/nonexistent/image.tar".into(),
                    name: None,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), EngineErrorKind::LocalIo);
        assert!(engine.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn import_from_url_opens_nothing() {
        let engine = engine(FakeTransport::new());

        let report = engine
            .import(
                &ImportOptions {
                    source: "https://example.com/rootfs.tar".to_string(),
                    source_is_url: true,
                    changes: vec!["CMD [\"/bin/sh\"]".to_string()],
                    message: "nightly".to_string(),
                    reference: Some("quay.io/team/base:nightly".to_string()),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.id.as_ref().map(|id| id.as_str()), Some("sha256:1mp0r7"));
        assert_eq!(report.names, ["quay.io/team/base:nightly"]);
        assert_eq!(
            engine.transport().calls(),
            vec![Call::Import {
                repo: "quay.io/team/base".into(),
                tag: "nightly".into(),
                message: "nightly".into(),
                changes: vec!["CMD [\"/bin/sh\"]".into()],
                source: "https://example.com/rootfs.tar".into(),
            }]
        );
    }

    #[tokio::test]
    async fn import_from_file_streams_it() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("rootfs.tar");
        std::fs::write(&source, vec![0u8; 2048]).unwrap();
        let engine = engine(FakeTransport::new());

        engine
            .import(
                &ImportOptions {
                    source: source.to_string_lossy().into_owned(),
                    reference: Some("base".to_string()),
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            &engine.transport().calls()[0],
            Call::Import { source, repo, tag, .. }
                if source == "<archive 2048 bytes>" && repo == "base" && tag.is_empty()
        ));
    }

    #[tokio::test]
    async fn import_rejects_nameless_reference() {
        let engine = engine(FakeTransport::new());

        let err = engine
            .import(
                &ImportOptions {
                    source: "https://example.com/rootfs.tar".to_string(),
                    source_is_url: true,
                    reference: Some(":v1".to_string()),
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidImageName(_)));
        assert!(engine.transport().calls().is_empty());
    }
}
