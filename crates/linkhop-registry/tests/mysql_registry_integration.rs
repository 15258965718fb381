use std::sync::Arc;

use linkhop_core::{Backend, ShortCode};
use linkhop_registry::{
    AddStatus, BatchItem, DeletionPipeline, DeletionRequest, IdentityResolver, Registry,
    RegistryError, SessionSigner,
};
use linkhop_storage::{MySqlBackend, MySqlBackendOptions};
use linkhop_test_infra::mysql::{MySqlServer, MysqlConfig};

struct Fixture {
    _mysql: MySqlServer,
    registry: Registry,
    resolver: IdentityResolver,
}

impl Fixture {
    async fn start() -> Self {
        let mysql = MySqlServer::new(MysqlConfig::builder().build())
            .await
            .expect("start mysql");
        let pool = mysql.connect().await.expect("connect mysql");

        let backend: Arc<dyn Backend> =
            Arc::new(MySqlBackend::new(pool, MySqlBackendOptions::default()));
        let registry = Registry::with_defaults(backend.clone());
        registry.restore().await.expect("create schema");
        let resolver = IdentityResolver::new(backend, SessionSigner::new(b"integration"));

        Self {
            _mysql: mysql,
            registry,
            resolver,
        }
    }
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn create_dedup_resolve_delete() {
    let fixture = Fixture::start().await;
    let session = fixture.resolver.resolve(None).await.unwrap();
    assert!(session.issued);

    let created = fixture
        .registry
        .add("https://example.com/a", session.user_id)
        .await
        .unwrap();
    assert_eq!(created.status, AddStatus::Created);

    let again = fixture
        .registry
        .add("https://example.com/a", session.user_id)
        .await
        .unwrap();
    assert_eq!(again.status, AddStatus::Existing);
    assert_eq!(again.code, created.code);

    assert_eq!(
        fixture.registry.get(&created.code).await.unwrap(),
        "https://example.com/a"
    );

    let pipeline = DeletionPipeline::spawn(16, fixture.registry.clone(), fixture.resolver.clone());
    pipeline
        .queue()
        .enqueue(DeletionRequest {
            codes: vec![created.code.clone()],
            owner_token: session.token.clone(),
        })
        .unwrap();
    pipeline.shutdown().await;

    let err = fixture.registry.get(&created.code).await.unwrap_err();
    assert!(matches!(err, RegistryError::Deleted(_)));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn other_users_cannot_delete() {
    let fixture = Fixture::start().await;
    let alice = fixture.resolver.resolve(None).await.unwrap();
    let mallory = fixture.resolver.resolve(None).await.unwrap();
    assert_ne!(alice.user_id, mallory.user_id);

    let link = fixture
        .registry
        .add("https://alice.example", alice.user_id)
        .await
        .unwrap();

    let flagged = fixture
        .registry
        .delete_batch(mallory.user_id, &[link.code.clone()])
        .await
        .unwrap();
    assert_eq!(flagged, 0);
    assert!(fixture.registry.get(&link.code).await.is_ok());
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn batch_and_owner_listing() {
    let fixture = Fixture::start().await;
    let session = fixture.resolver.resolve(None).await.unwrap();

    let items = (0..3)
        .map(|i| BatchItem {
            correlation_id: format!("corr-{i}"),
            original_url: format!("https://example.com/{i}"),
        })
        .collect();
    let entries = fixture
        .registry
        .add_batch(session.user_id, items)
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);

    let listed = fixture
        .registry
        .list_by_owner(session.user_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);

    let codes: Vec<ShortCode> = entries.iter().map(|e| e.code.clone()).collect();
    assert!(listed.iter().all(|r| codes.contains(&r.code)));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn strict_authentication_and_health() {
    let fixture = Fixture::start().await;

    fixture.registry.health_check().await.unwrap();

    let orphan = SessionSigner::new(b"integration")
        .sign(linkhop_core::UserId::new(4242))
        .unwrap();
    assert_eq!(
        fixture.resolver.authenticate(Some(&orphan)).await,
        Err(RegistryError::Unauthorized)
    );

    let session = fixture.resolver.resolve(Some(&orphan)).await.unwrap();
    assert!(session.issued);
    assert_eq!(
        fixture.resolver.authenticate(Some(&session.token)).await.unwrap(),
        session.user_id
    );
}
