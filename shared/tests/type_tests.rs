/// Integration-level tests for the `shared` crate.
///
/// Each section tests one module; unit tests that are tightly coupled to
/// private helpers live inside the modules themselves (see `#[cfg(test)]`
/// blocks in `error.rs` and `config.rs`).
// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------
#[cfg(test)]
mod error_tests {
    use http::StatusCode;
    use shared::types::UserFacingError;

    fn all_variants() -> Vec<UserFacingError> {
        vec![
            UserFacingError::DomainNotFound("acmoj".into()),
            UserFacingError::DocumentNotFound("system".into(), 3),
            UserFacingError::Login("icebear".into()),
            UserFacingError::PermissionDenied(0b100),
            UserFacingError::PrivilegeDenied(0b1),
            UserFacingError::CsrfToken,
            UserFacingError::InvalidOperation("".into()),
            UserFacingError::Validation("lid".into()),
        ]
    }

    #[test]
    fn wire_names_are_unique() {
        let names: Vec<_> = all_variants().iter().map(|e| e.name()).collect();
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len(), "duplicate error names");
    }

    #[test]
    fn every_variant_ends_in_error_suffix() {
        for e in all_variants() {
            assert!(e.name().ends_with("Error"), "bad name: {}", e.name());
        }
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            UserFacingError::DomainNotFound("x".into()).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            UserFacingError::DocumentNotFound("x".into(), 1).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            UserFacingError::PermissionDenied(1).http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            UserFacingError::CsrfToken.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            UserFacingError::InvalidOperation("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UserFacingError::Validation("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn to_dict_carries_positional_args() {
        let dict = UserFacingError::DocumentNotFound("system".into(), 42).to_dict();
        assert_eq!(dict["name"], "DocumentNotFoundError");
        assert_eq!(dict["args"][0], "system");
        assert_eq!(dict["args"][1], 42);
        assert!(dict["message"].as_str().is_some());
    }

    #[test]
    fn missing_operation_keeps_empty_string_arg() {
        let dict = UserFacingError::InvalidOperation(String::new()).to_dict();
        assert_eq!(dict["args"][0], "");
    }
}

// ---------------------------------------------------------------------------
// Session types
// ---------------------------------------------------------------------------

#[cfg(test)]
mod session_tests {
    use serde_json::json;
    use shared::types::{Session, TokenType};

    #[test]
    fn token_type_roundtrips_through_i64() {
        for t in [TokenType::UnsavedSession, TokenType::SavedSession] {
            assert_eq!(TokenType::from_i64(t.as_i64()), Some(t));
        }
        assert_eq!(TokenType::from_i64(99), None);
    }

    #[test]
    fn saved_class_is_marked() {
        assert!(TokenType::SavedSession.is_saved());
        assert!(!TokenType::UnsavedSession.is_saved());
    }

    #[test]
    fn uid_reads_the_uid_field() {
        let mut fields = serde_json::Map::new();
        fields.insert("uid".into(), json!(42));
        let s = Session {
            id: "abc".into(),
            token_type: TokenType::UnsavedSession,
            expire_at: 0,
            fields,
        };
        assert_eq!(s.uid(), Some(42));
    }

    #[test]
    fn uid_is_none_without_the_field() {
        let s = Session {
            id: "abc".into(),
            token_type: TokenType::UnsavedSession,
            expire_at: 0,
            fields: serde_json::Map::new(),
        };
        assert_eq!(s.uid(), None);
    }

    #[test]
    fn non_numeric_uid_reads_as_none() {
        let mut fields = serde_json::Map::new();
        fields.insert("uid".into(), json!("42"));
        let s = Session {
            id: "abc".into(),
            token_type: TokenType::SavedSession,
            expire_at: 0,
            fields,
        };
        assert_eq!(s.uid(), None);
    }
}

// ---------------------------------------------------------------------------
// User types
// ---------------------------------------------------------------------------

#[cfg(test)]
mod user_tests {
    use shared::types::user::{PRIV_DEFAULT, PRIV_REGISTER_USER, UID_GUEST};
    use shared::types::User;

    #[test]
    fn guest_has_guest_uid_and_default_priv() {
        let g = User::guest();
        assert_eq!(g.uid, UID_GUEST);
        assert!(g.is_guest());
        assert_eq!(g.priv_bits, PRIV_DEFAULT);
        assert_eq!(PRIV_DEFAULT, PRIV_REGISTER_USER);
    }

    #[test]
    fn priv_serializes_under_legacy_key() {
        let json = serde_json::to_value(User::guest()).unwrap();
        assert!(json.get("priv").is_some());
        assert!(json.get("priv_bits").is_none());
    }

    #[test]
    fn password_hash_never_serializes() {
        let mut u = User::guest();
        u.password_hash = Some("$argon2id$...".into());
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[cfg(test)]
mod domain_tests {
    use shared::types::domain::{
        DOMAIN_ID_SYSTEM, PERM_VIEW, PERM_VIEW_PROBLEM_LIST, ROLE_ADMIN, ROLE_DEFAULT,
    };
    use shared::types::Domain;

    #[test]
    fn system_domain_is_builtin() {
        let d = Domain::system();
        assert_eq!(d.id, DOMAIN_ID_SYSTEM);
        assert!(d.roles.contains_key(ROLE_DEFAULT));
        assert!(d.roles.contains_key(ROLE_ADMIN));
    }

    #[test]
    fn system_default_role_views_problem_lists() {
        let mask = Domain::system().roles[ROLE_DEFAULT];
        assert_eq!(mask & PERM_VIEW, PERM_VIEW);
        assert_eq!(mask & PERM_VIEW_PROBLEM_LIST, PERM_VIEW_PROBLEM_LIST);
    }

    #[test]
    fn domain_deserializes_with_defaults() {
        let d: Domain = serde_json::from_str(r#"{"id": "numeric", "owner_uid": 7}"#).unwrap();
        assert_eq!(d.id, "numeric");
        assert_eq!(d.owner_uid, 7);
        assert!(d.name.is_empty());
        assert!(d.roles.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[cfg(test)]
mod config_tests {
    use shared::types::AppConfig;

    #[test]
    fn full_config_parses() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0"
            port = 8888
            ip_header = "x-forwarded-for"

            [cookie]
            domain = "example.org"
            secure = true

            [session]
            saved_expire_seconds = 1209600
            unsaved_expire_seconds = 7200

            [auth]
            csrf_key = "sixteen-byte-key"

            [locale]
            default_lang = "zh"
            timezone = "UTC"

            [paths]
            templates_dir = "ui/templates"
            url_prefix = "https://judge.example.org"
            cdn_prefix = "https://cdn.example.org"

            [database]
            url = "sqlite://test.db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.ip_header.as_deref(), Some("x-forwarded-for"));
        assert!(cfg.cookie.secure);
        assert_eq!(cfg.session.saved_expire_seconds, 1_209_600);
        assert_eq!(cfg.locale.default_lang, "zh");
        assert_eq!(cfg.paths.templates_dir, "ui/templates");
        assert_eq!(cfg.database.url, "sqlite://test.db");
    }

    #[test]
    fn session_defaults_are_thirty_days_and_three_hours() {
        let cfg: AppConfig = toml::from_str("[server]\n").unwrap();
        assert_eq!(cfg.session.saved_expire_seconds, 30 * 24 * 3600);
        assert_eq!(cfg.session.unsaved_expire_seconds, 3 * 3600);
    }
}
