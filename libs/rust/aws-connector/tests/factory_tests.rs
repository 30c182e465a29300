//! Building holders from connection parameters, testing connections and
//! exposing credentials to builds.

use aws_connector::build_context::{
    ACCESS_KEY_ID_ENV, DEFAULT_REGION_ENV, SECRET_ACCESS_KEY_ENV, SESSION_TOKEN_ENV,
};
use aws_connector::params::{
    CREDENTIALS_TYPE_PARAM, SESSION_CREDENTIALS_PARAM, SESSION_DURATION_PARAM, STS_ENDPOINT_PARAM,
};
use aws_connector::provider::{ChainedCredentials, EnvironmentCredentials};
use aws_connector::{
    BuildCredentialsExporter, ConnectionTester, ConnectorConfig, ConnectorError,
    CredentialsError, CredentialsFactory, CredentialsHolder, ProviderError,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration as TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use test_utils::MockAwsProvider;
use tokio_test::{assert_err, assert_ok};
use test_utils::fixtures::{
    OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, TEST_REGION, TEST_USER, default_provider_params,
    sample_connection, session_connection_params, static_connection_params,
};

fn provider() -> Arc<MockAwsProvider> {
    Arc::new(MockAwsProvider::new().with_key(TEST_USER, OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY))
}

fn ambient_env(vars: &[(&'static str, &'static str)]) -> EnvironmentCredentials {
    let vars: HashMap<&'static str, &'static str> = vars.iter().copied().collect();
    EnvironmentCredentials::from_lookup(move |name| vars.get(name).map(|v| (*v).to_string()))
}

fn factory_with(provider: &Arc<MockAwsProvider>, ambient: EnvironmentCredentials) -> CredentialsFactory {
    CredentialsFactory::new(
        provider.clone(),
        Arc::new(ChainedCredentials::new().with_link(Arc::new(ambient))),
        ConnectorConfig::default(),
    )
}

fn factory(provider: &Arc<MockAwsProvider>) -> CredentialsFactory {
    factory_with(provider, ambient_env(&[]))
}

#[tokio::test]
async fn test_static_keys_without_session() {
    let provider = provider();
    let holder = factory(&provider)
        .build_holder(
            &static_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY),
            None,
        )
        .await
        .unwrap();

    let credentials = holder.credentials();
    assert_eq!(credentials.access_key_id(), OLD_ACCESS_KEY_ID);
    assert!(!credentials.is_temporary());
    assert!(holder.session_expiration().is_none());
    assert_eq!(provider.call_count("get_session_token"), 0);
}

#[tokio::test]
async fn test_session_credentials_expire_within_requested_duration() {
    let provider = provider();
    let before = Utc::now();
    let holder = factory(&provider)
        .build_holder(
            &session_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, 60),
            None,
        )
        .await
        .unwrap();

    let expires_at = holder.session_expiration().unwrap();
    assert!(expires_at > before);
    assert!(expires_at <= Utc::now() + TimeDelta::minutes(60));
    assert!(holder.credentials().is_temporary());
    assert_ne!(holder.credentials().access_key_id(), OLD_ACCESS_KEY_ID);
}

#[tokio::test]
async fn test_session_duration_override() {
    let provider = provider();
    let holder = factory(&provider)
        .build_holder(
            &session_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, 600),
            Some(Duration::from_secs(15 * 60)),
        )
        .await
        .unwrap();

    let expires_at = holder.session_expiration().unwrap();
    assert!(expires_at <= Utc::now() + TimeDelta::minutes(15));
}

#[tokio::test]
async fn test_session_duration_override_out_of_range() {
    let provider = provider();
    let err = factory(&provider)
        .build_holder(
            &session_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, 60),
            Some(Duration::from_secs(5 * 60)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CredentialsError::InvalidSessionDuration { .. }));
    assert_eq!(provider.call_count("get_session_token"), 0);
}

#[tokio::test]
async fn test_session_is_the_default() {
    let provider = provider();
    let mut params = static_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY);
    params.remove(SESSION_CREDENTIALS_PARAM);

    let holder = factory(&provider).build_holder(&params, None).await.unwrap();

    assert!(holder.session_expiration().is_some());
}

#[tokio::test]
async fn test_invalid_parameters_are_all_reported() {
    let provider = provider();
    let mut params = HashMap::new();
    params.insert(SESSION_DURATION_PARAM.to_string(), "5".to_string());
    params.insert(STS_ENDPOINT_PARAM.to_string(), "http://sts.example.com".to_string());

    let err = factory(&provider).build_holder(&params, None).await.unwrap_err();

    let CredentialsError::InvalidProperties(invalid) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(invalid.len() >= 3, "{invalid:?}");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_credentials_type() {
    let provider = provider();
    let mut params = static_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY);
    params.insert(CREDENTIALS_TYPE_PARAM.to_string(), "iamRole".to_string());

    let err = factory(&provider).build_holder(&params, None).await.unwrap_err();

    assert!(matches!(err, CredentialsError::UnsupportedCredentialsType(_)));
}

#[tokio::test]
async fn test_default_provider_resolves_ambient_credentials() {
    let provider = provider();
    let factory = factory_with(
        &provider,
        ambient_env(&[
            ("AWS_ACCESS_KEY_ID", "AKIAAMBIENT000000000"),
            ("AWS_SECRET_ACCESS_KEY", "ambient-secret"),
        ]),
    );

    let holder = assert_ok!(factory.build_holder(&default_provider_params(), None).await);

    assert_eq!(holder.credentials().access_key_id(), "AKIAAMBIENT000000000");
    assert!(holder.session_expiration().is_none());
}

#[tokio::test]
async fn test_default_provider_without_ambient_credentials() {
    let provider = provider();

    let err = assert_err!(
        factory(&provider)
            .build_holder(&default_provider_params(), None)
            .await
    );

    assert!(matches!(err, CredentialsError::Resolution(_)));
}

#[tokio::test]
async fn test_connection_test_identifies_caller() {
    let provider = provider();
    let factory = factory(&provider);
    let tester = ConnectionTester::new(provider.clone());

    let identity = tester
        .test_parameters(
            &factory,
            &session_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, 60),
        )
        .await
        .unwrap();

    assert!(identity.arn.ends_with(&format!("user/{TEST_USER}")));
    assert_eq!(provider.call_count("get_caller_identity"), 1);
}

#[tokio::test]
async fn test_connection_test_with_wrong_secret() {
    let provider = provider();
    let factory = factory(&provider);
    let tester = ConnectionTester::new(provider.clone());

    let err = tester
        .test_parameters(&factory, &static_connection_params(OLD_ACCESS_KEY_ID, "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Provider(ProviderError::InvalidCredentials(_))
    ));

    let err = tester
        .test_parameters(
            &factory,
            &session_connection_params(OLD_ACCESS_KEY_ID, "wrong", 60),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Credentials(CredentialsError::SessionExchange(_))
    ));
}

#[tokio::test]
async fn test_connection_test_of_holder() {
    let provider = provider();
    let holder: Arc<dyn CredentialsHolder> = factory(&provider)
        .build_for(&sample_connection(), None)
        .await
        .unwrap();

    let identity = ConnectionTester::new(provider.clone())
        .test_connection(holder.as_ref())
        .await
        .unwrap();

    assert_eq!(identity.account, test_utils::mocks::MOCK_ACCOUNT_ID);
}

#[tokio::test]
async fn test_expose_static_connection() {
    let provider = provider();
    let exporter = BuildCredentialsExporter::new(factory(&provider));

    let exposed = exporter.expose(&sample_connection(), None).await.unwrap();

    assert_eq!(exposed.environment[ACCESS_KEY_ID_ENV], OLD_ACCESS_KEY_ID);
    assert_eq!(exposed.environment[SECRET_ACCESS_KEY_ENV], OLD_SECRET_ACCESS_KEY);
    assert_eq!(exposed.environment[DEFAULT_REGION_ENV], TEST_REGION);
    assert!(!exposed.environment.contains_key(SESSION_TOKEN_ENV));
    assert_eq!(exposed.password_parameters, vec![SECRET_ACCESS_KEY_ENV.to_string()]);
    assert!(exposed.expires_at.is_none());

    let profile = String::from_utf8(STANDARD.decode(&exposed.encoded_profile).unwrap()).unwrap();
    assert!(profile.starts_with("[default]\n"));
    assert!(profile.contains(&format!("aws_access_key_id={OLD_ACCESS_KEY_ID}")));
    assert!(profile.contains(&format!("aws_secret_access_key={OLD_SECRET_ACCESS_KEY}")));
    assert!(!profile.contains("aws_session_token"));

    let debug = format!("{exposed:?}");
    assert!(!debug.contains(OLD_SECRET_ACCESS_KEY));
}

#[tokio::test]
async fn test_expose_session_connection() {
    let provider = provider();
    let exporter = BuildCredentialsExporter::new(factory(&provider));
    let record = aws_connector::ConnectionRecord::new(
        "PROJECT_EXT_2",
        session_connection_params(OLD_ACCESS_KEY_ID, OLD_SECRET_ACCESS_KEY, 60),
    );

    let exposed = exporter
        .expose(&record, Some(Duration::from_secs(30 * 60)))
        .await
        .unwrap();

    assert!(exposed.environment[ACCESS_KEY_ID_ENV].starts_with("ASIA"));
    assert!(exposed.environment.contains_key(SESSION_TOKEN_ENV));
    assert_eq!(
        exposed.password_parameters,
        vec![
            SECRET_ACCESS_KEY_ENV.to_string(),
            SESSION_TOKEN_ENV.to_string()
        ]
    );
    let expires_at = exposed.expires_at.unwrap();
    assert!(expires_at > Utc::now());
    assert!(expires_at <= Utc::now() + TimeDelta::minutes(30));

    let profile = String::from_utf8(STANDARD.decode(&exposed.encoded_profile).unwrap()).unwrap();
    assert!(profile.contains("aws_session_token=session-token-"));
}
