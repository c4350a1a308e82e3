mod common;

use anyhow::Result;
use authgate::auth::{
    crypto::digest_token,
    email::{TEMPLATE_PASSWORD_RESET, TEMPLATE_VERIFY_EMAIL},
    models::{OneTimeToken, Session, TokenPurpose, User},
    repo::{SessionRepository, UserRepository},
    AuthError, CleanupReport, TokenCodec, TokenKind,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

use common::{
    device, harness, hasher, service_with, token_from, verified_user, CapturingDispatcher,
    Harness,
};

const EMAIL: &str = "alice@example.com";
const PASSWORD: &str = "Secret123!";

#[tokio::test]
async fn login_then_refresh_keeps_session_id() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    let user = verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    assert_eq!(login.user.id, user.id);
    assert_eq!(login.expires_in, 900);

    let first = service
        .codec()
        .parse_and_validate(&login.access_token, TokenKind::Access)?;

    let refreshed = service.refresh_token(&login.refresh_token).await?;
    let second = service
        .codec()
        .parse_and_validate(&refreshed.access_token, TokenKind::Access)?;

    assert_eq!(first.session_id, second.session_id);
    assert_ne!(first.jti, second.jti);
    assert_eq!(second.sub, user.id.to_string());
    assert_eq!(second.email, EMAIL);
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let wrong_password = service
        .login(EMAIL, "NotThePassword1", device("laptop"))
        .await
        .err();
    let unknown_email = service
        .login("nobody@example.com", PASSWORD, device("laptop"))
        .await
        .err();

    assert!(matches!(wrong_password, Some(AuthError::InvalidCredentials)));
    assert!(matches!(unknown_email, Some(AuthError::InvalidCredentials)));
    assert_eq!(
        wrong_password.map(|err| err.to_string()),
        unknown_email.map(|err| err.to_string())
    );
    Ok(())
}

#[tokio::test]
async fn reset_password_revokes_every_session() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let laptop = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    let phone = service.login(EMAIL, PASSWORD, device("phone")).await?;

    service.forgot_password(EMAIL).await?;
    let reset = token_from(&dispatcher.last(TEMPLATE_PASSWORD_RESET)?, "reset_url")?;
    service.reset_password(&reset, "BrandNew456!").await?;

    for refresh in [laptop.refresh_token, phone.refresh_token] {
        assert!(matches!(
            service.refresh_token(&refresh).await,
            Err(AuthError::TokenExpired)
        ));
    }

    assert!(matches!(
        service.login(EMAIL, PASSWORD, device("laptop")).await,
        Err(AuthError::InvalidCredentials)
    ));
    service.login(EMAIL, "BrandNew456!", device("laptop")).await?;
    Ok(())
}

#[tokio::test]
async fn change_password_keeps_sessions() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    let user = verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;

    assert!(matches!(
        service
            .change_password(user.id, "WrongCurrent1", "BrandNew456!")
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    service
        .change_password(user.id, PASSWORD, "BrandNew456!")
        .await?;
    service.refresh_token(&login.refresh_token).await?;
    service.login(EMAIL, "BrandNew456!", device("phone")).await?;
    Ok(())
}

#[tokio::test]
async fn one_time_tokens_are_single_use() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;

    service.register(EMAIL, PASSWORD, "Alice").await?;
    let verify = token_from(&dispatcher.last(TEMPLATE_VERIFY_EMAIL)?, "verify_url")?;
    service.verify_email(&verify).await?;
    assert!(matches!(
        service.verify_email(&verify).await,
        Err(AuthError::InvalidToken)
    ));

    service.forgot_password(EMAIL).await?;
    let reset = token_from(&dispatcher.last(TEMPLATE_PASSWORD_RESET)?, "reset_url")?;
    service.reset_password(&reset, "BrandNew456!").await?;
    assert!(matches!(
        service.reset_password(&reset, "Another789!").await,
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn concurrent_reset_has_one_winner() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    service.forgot_password(EMAIL).await?;
    let reset = token_from(&dispatcher.last(TEMPLATE_PASSWORD_RESET)?, "reset_url")?;

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = service.clone();
        let reset = reset.clone();
        handles.push(tokio::spawn(async move {
            service
                .reset_password(&reset, &format!("Parallel{i}Secret"))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn revoking_foreign_session_looks_like_missing_session() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;
    let mallory = verified_user(&service, &dispatcher, "mallory@example.com", PASSWORD).await?;

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    let alice_session = service
        .codec()
        .parse_and_validate(&login.access_token, TokenKind::Access)?
        .session_uuid();
    let Some(alice_session) = alice_session else {
        anyhow::bail!("access token without session id");
    };

    let foreign = service.revoke_session(mallory.id, alice_session).await.err();
    let missing = service
        .revoke_session(mallory.id, Uuid::new_v4())
        .await
        .err();

    assert!(matches!(foreign, Some(AuthError::SessionNotFound)));
    assert!(matches!(missing, Some(AuthError::SessionNotFound)));

    // Alice's session survived the attempt.
    service.refresh_token(&login.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn token_kinds_are_not_interchangeable() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;

    assert!(matches!(
        service.refresh_token(&login.access_token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(service
        .codec()
        .parse_and_validate(&login.refresh_token, TokenKind::Access)
        .is_err());

    let anonymous = service.create_anonymous_session().await?;
    assert!(matches!(
        service.refresh_token(&anonymous.token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(service
        .codec()
        .parse_and_validate(&anonymous.token, TokenKind::Access)
        .is_err());
    Ok(())
}

#[tokio::test]
async fn refresh_token_cannot_be_replayed_after_rotation() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    let rotated = service.refresh_token(&login.refresh_token).await?;

    assert!(matches!(
        service.refresh_token(&login.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
    service.refresh_token(&rotated.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn full_lifecycle_ends_with_rejected_refresh() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;

    let user = service.register(EMAIL, PASSWORD, "Alice").await?;
    assert!(!user.is_verified);
    assert!(matches!(
        service.login(EMAIL, PASSWORD, device("laptop")).await,
        Err(AuthError::UserNotVerified)
    ));

    let verify = token_from(&dispatcher.last(TEMPLATE_VERIFY_EMAIL)?, "verify_url")?;
    service.verify_email(&verify).await?;
    assert!(service.get_user(user.id).await?.is_verified);

    let login = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    let first = service.refresh_token(&login.refresh_token).await?;
    let second = service.refresh_token(&first.refresh_token).await?;

    service.logout(user.id, None).await?;

    assert!(matches!(
        service.refresh_token(&second.refresh_token).await,
        Err(AuthError::TokenExpired)
    ));
    assert!(service.get_user_sessions(user.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_single_session_leaves_others() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    let user = verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    let laptop = service.login(EMAIL, PASSWORD, device("laptop")).await?;
    let phone = service.login(EMAIL, PASSWORD, device("phone")).await?;
    assert_eq!(service.get_user_sessions(user.id).await?.len(), 2);

    let laptop_session = service
        .codec()
        .parse_and_validate(&laptop.access_token, TokenKind::Access)?
        .session_uuid();
    service.logout(user.id, laptop_session).await?;

    assert!(service.refresh_token(&laptop.refresh_token).await.is_err());
    service.refresh_token(&phone.refresh_token).await?;

    let sessions = service.get_user_sessions(user.id).await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].device_id, "phone");
    Ok(())
}

#[tokio::test]
async fn anonymous_token_expires_exactly_after_a_day() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher)?;

    let session = service.create_anonymous_session().await?;
    assert_eq!(session.created_at, session.created_at.trunc_subsecs(0));
    assert_eq!(session.expires_at - session.created_at, Duration::hours(24));

    let codec = TokenCodec::new(&common::config()?);
    let just_before = session.expires_at - Duration::milliseconds(1);
    let claims = codec.parse_and_validate_at(&session.token, TokenKind::Anonymous, just_before)?;
    assert_eq!(claims.sub, session.id.to_string());
    assert_eq!(claims.session_id, session.id.to_string());
    assert_eq!(claims.exp, session.expires_at.timestamp());
    assert!(claims.roles.is_empty());

    for at in [
        session.expires_at,
        session.expires_at + Duration::milliseconds(500),
        session.expires_at + Duration::seconds(1),
    ] {
        assert!(codec
            .parse_and_validate_at(&session.token, TokenKind::Anonymous, at)
            .is_err());
    }
    Ok(())
}

#[tokio::test]
async fn forgot_and_resend_never_reveal_accounts() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    service.forgot_password("ghost@example.com").await?;
    service.resend_verification("ghost@example.com").await?;
    assert_eq!(dispatcher.count(TEMPLATE_PASSWORD_RESET), 0);

    // Already verified: nothing new goes out.
    service.resend_verification(EMAIL).await?;
    assert_eq!(dispatcher.count(TEMPLATE_VERIFY_EMAIL), 1);

    service.forgot_password(EMAIL).await?;
    assert_eq!(dispatcher.count(TEMPLATE_PASSWORD_RESET), 1);
    Ok(())
}

#[tokio::test]
async fn resend_sends_a_fresh_working_link() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;

    service.register(EMAIL, PASSWORD, "Alice").await?;
    service.resend_verification(EMAIL).await?;
    assert_eq!(dispatcher.count(TEMPLATE_VERIFY_EMAIL), 2);

    let latest = token_from(&dispatcher.last(TEMPLATE_VERIFY_EMAIL)?, "verify_url")?;
    service.verify_email(&latest).await?;
    service.login(EMAIL, PASSWORD, device("laptop")).await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts_case_insensitively() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher)?;

    service.register(EMAIL, PASSWORD, "Alice").await?;
    assert!(matches!(
        service.register(" ALICE@example.com ", PASSWORD, "Alice").await,
        Err(AuthError::UserAlreadyExists)
    ));
    Ok(())
}

#[tokio::test]
async fn cleanup_reports_nothing_for_fresh_sessions() -> Result<()> {
    let dispatcher = Arc::new(CapturingDispatcher::default());
    let service = service_with(dispatcher.clone())?;
    verified_user(&service, &dispatcher, EMAIL, PASSWORD).await?;

    service.login(EMAIL, PASSWORD, device("laptop")).await?;
    service.create_anonymous_session().await?;

    // Only the consumed verification token is spent.
    assert_eq!(
        service.cleanup_expired().await?,
        CleanupReport {
            sessions: 0,
            anonymous_sessions: 0,
            one_time_tokens: 1,
        }
    );
    Ok(())
}

#[tokio::test]
async fn cleanup_reaps_everything_past_its_expiry() -> Result<()> {
    let h = harness()?;
    verified_user(&h.service, &h.dispatcher, EMAIL, PASSWORD).await?;
    h.service.login(EMAIL, PASSWORD, device("laptop")).await?;
    h.service.create_anonymous_session().await?;
    h.service.forgot_password(EMAIL).await?;

    let later = Utc::now() + Duration::days(8);
    assert_eq!(
        h.service.cleanup_expired_at(later).await?,
        CleanupReport {
            sessions: 1,
            anonymous_sessions: 1,
            one_time_tokens: 2,
        }
    );
    assert!(h.service.cleanup_expired_at(later).await?.is_empty());
    Ok(())
}

/// Insert a verified user directly, bypassing registration.
async fn seeded_user(h: &Harness, is_active: bool) -> Result<User> {
    let mut user = User::new(EMAIL.to_string(), "Alice".to_string(), Utc::now());
    user.is_verified = true;
    user.is_active = is_active;
    h.users.create_user(&user, &hasher()?.hash(PASSWORD)?).await?;
    Ok(user)
}

/// Insert a session for `user_id` and return a refresh token bound to it.
async fn seeded_session(
    h: &Harness,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<String> {
    let session_id = Uuid::new_v4();
    let issued = h.service.codec().issue_refresh_token(user_id, session_id)?;
    h.sessions
        .create_session(&Session {
            id: session_id,
            user_id,
            refresh_token_handle: issued.jti,
            device_id: "laptop".to_string(),
            user_agent: "integration-tests".to_string(),
            ip_address: "127.0.0.1".to_string(),
            created_at: Utc::now(),
            expires_at,
            is_active: true,
        })
        .await?;
    Ok(issued.token)
}

#[tokio::test]
async fn disabled_user_cannot_login() -> Result<()> {
    let h = harness()?;
    seeded_user(&h, false).await?;

    assert!(matches!(
        h.service.login(EMAIL, PASSWORD, device("laptop")).await,
        Err(AuthError::UserDisabled)
    ));
    // Without the password the account state stays hidden.
    assert!(matches!(
        h.service.login(EMAIL, "NotThePassword1", device("laptop")).await,
        Err(AuthError::InvalidCredentials)
    ));
    Ok(())
}

#[tokio::test]
async fn refresh_for_disabled_or_missing_user_is_invalid() -> Result<()> {
    let h = harness()?;
    let week = Utc::now() + Duration::days(7);

    let disabled = seeded_user(&h, false).await?;
    let token = seeded_session(&h, disabled.id, week).await?;
    assert!(matches!(
        h.service.refresh_token(&token).await,
        Err(AuthError::InvalidToken)
    ));

    let token = seeded_session(&h, Uuid::new_v4(), week).await?;
    assert!(matches!(
        h.service.refresh_token(&token).await,
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn refresh_on_expired_session_reports_expiry() -> Result<()> {
    let h = harness()?;
    let user = seeded_user(&h, true).await?;

    let token = seeded_session(&h, user.id, Utc::now() - Duration::minutes(1)).await?;
    assert!(matches!(
        h.service.refresh_token(&token).await,
        Err(AuthError::TokenExpired)
    ));
    Ok(())
}

#[tokio::test]
async fn expired_one_time_tokens_are_invalid() -> Result<()> {
    let h = harness()?;
    let user = seeded_user(&h, true).await?;
    let now = Utc::now();
    let expired = |purpose, raw: &str| OneTimeToken {
        user_id: user.id,
        purpose,
        token_hash: digest_token(raw),
        expires_at: now - Duration::seconds(1),
        used: false,
        created_at: now - Duration::hours(2),
    };

    h.users
        .create_password_reset_token(&expired(TokenPurpose::PasswordReset, "stale-reset"))
        .await?;
    assert!(matches!(
        h.service.reset_password("stale-reset", "BrandNew123!").await,
        Err(AuthError::InvalidToken)
    ));
    // The old password still works.
    h.service.login(EMAIL, PASSWORD, device("laptop")).await?;

    h.users
        .create_email_verification_token(&expired(
            TokenPurpose::EmailVerification,
            "stale-verify",
        ))
        .await?;
    assert!(matches!(
        h.service.verify_email("stale-verify").await,
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}
