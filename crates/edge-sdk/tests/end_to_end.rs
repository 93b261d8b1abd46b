//! End-to-end fragment delivery through the SDK runtime.

use std::collections::HashMap;
use std::sync::Arc;

use edge_sdk::prelude::*;
use http::StatusCode;

struct Sidebar;

impl BlockSource for Sidebar {
    fn render_block(
        &self,
        location: &BlockLocation,
        page_path: Option<&str>,
        principal: &Principal,
    ) -> Result<Option<String>, ProviderError> {
        Ok(Some(format!(
            "<div id=\"{}\">{} on {}</div>",
            location.block_id(),
            principal.roles().join(","),
            page_path.unwrap_or("?")
        )))
    }
}

fn login_block() -> BlockLocation {
    BlockLocation::new("bartik", "sidebar", "user", "login")
}

fn runtime_with(config: EsiConfig, clock: Arc<ManualClock>) -> FragmentRuntime {
    let blocks = BlockProvider::new(Arc::new(Sidebar), Arc::new(InMemoryBlockSettings::new()));
    FragmentRuntime::builder(config)
        .component(BLOCK_COMPONENT, blocks, "tests")
        .fragment_store(Arc::new(InMemoryFragmentStore::new()))
        .clock(clock)
        .debug_headers(true)
        .build()
        .unwrap()
}

fn editor() -> Principal {
    Principal::authenticated("7", "sess_abc", ["editor"])
}

#[test]
fn test_encode_decode_role_scoped_block() {
    let runtime = runtime_with(EsiConfig::default(), Arc::new(ManualClock::new(1_000)));
    let codec = runtime.dispatcher().codec();

    let path = codec
        .encode(
            "block",
            &login_block(),
            VaryFlags::per_role().with_page(),
            Some("/node/5"),
        )
        .unwrap();
    assert_eq!(path, "esi/block/bartik:sidebar:user:login/L25vZGUvNQ/CACHE=ROLE");

    let request = codec.decode(&path).unwrap();
    assert_eq!(request.component_key, "block");
    assert_eq!(request.location, login_block());
    assert_eq!(request.page_path().unwrap().as_deref(), Some("/node/5"));
    assert_eq!(request.cache_scope, Some(CacheScope::Role));

    // Padded standard base64 from other producers is accepted too.
    let padded = codec
        .decode("esi/block/bartik:sidebar:user:login/L25vZGUvNQ==/CACHE=ROLE")
        .unwrap();
    assert_eq!(padded.page_path().unwrap().as_deref(), Some("/node/5"));
}

#[test]
fn test_ssi_tag_verbatim() {
    let runtime = runtime_with(EsiConfig::default(), Arc::new(ManualClock::new(1_000)));
    assert_eq!(
        runtime.tags().render("esi/block/x", Some("ssi")),
        r#"<!--# include virtual="esi/block/x" -->"#
    );
}

#[test]
fn test_stale_seed_rotates_exactly_once() {
    let stale = Seed::from_parts("a".repeat(SEED_LENGTH), 10_000);
    let clock = Arc::new(ManualClock::new(100_000));
    let runtime = FragmentRuntime::builder(EsiConfig::default())
        .seed_backend(Arc::new(InMemorySeedBackend::with_seed(stale.clone())))
        .clock(clock)
        .build()
        .unwrap();

    let fresh = runtime.seeds().get_seed().unwrap();
    assert_eq!(fresh.as_bytes().len(), SEED_LENGTH);
    assert_ne!(fresh.as_bytes(), stale.as_bytes());
    assert_eq!(fresh.last_changed(), 100_000);

    let again = runtime.seeds().get_seed().unwrap();
    assert_eq!(again.as_bytes(), fresh.as_bytes());
    assert!(!runtime.run_maintenance().unwrap());
}

#[test]
fn test_undecodable_path_is_bare_not_found() {
    let runtime = runtime_with(EsiConfig::default(), Arc::new(ManualClock::new(1_000)));
    for path in ["esi/block/not-a-location", "/esi", "esi/block/a:b:c:d/%%%/CACHE=ROLE"] {
        let response = runtime.dispatch(path, &editor());
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", path);
        assert!(response.body.is_empty(), "{}", path);
    }
}

#[test]
fn test_page_to_fragment_round_trip() {
    let config = EsiConfig {
        ajax_fallback: true,
        ..EsiConfig::default()
    };
    let runtime = runtime_with(config, Arc::new(ManualClock::new(1_000)));

    let html = runtime
        .embed(
            BLOCK_COMPONENT,
            &login_block(),
            VaryFlags::per_role().with_page(),
            Some("/node/5"),
            None,
        )
        .unwrap();
    assert!(html.starts_with(r#"<div class="esi-fallback" data-src="/esi/block/"#));

    let path = "/esi/block/bartik:sidebar:user:login/L25vZGUvNQ/CACHE=ROLE";
    assert!(html.contains(&format!(r#"<esi:include src="{}" />"#, path)));

    let first = runtime.dispatch(path, &editor());
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(
        first.body,
        r#"<div id="user:login">authenticated,editor on /node/5</div>"#
    );
    assert_eq!(first.header("Vary"), Some("Cookie"));
    assert_eq!(first.header("X-Fragment-Context"), Some("ROLE"));
    assert_eq!(first.header("X-Cache-Status"), Some("MISS"));

    // Same role set, different user: served from the role-keyed entry.
    let colleague = Principal::authenticated("8", "sess_def", ["editor"]);
    let second = runtime.dispatch(path, &colleague);
    assert_eq!(second.header("X-Cache-Status"), Some("HIT"));
    assert_eq!(second.body, first.body);

    let report = runtime.flush();
    assert_eq!(report.providers, 1);
    assert_eq!(report.entries_cleared, 1);
    assert_eq!(runtime.flush().entries_cleared, 0);
}

#[test]
fn test_registry_override_at_runtime() {
    struct Replacement;
    impl ComponentProvider for Replacement {
        fn render(
            &self,
            _request: &FragmentRequest,
            _principal: &Principal,
        ) -> Result<RenderedFragment, ProviderError> {
            Ok(RenderedFragment::new("replaced"))
        }
    }

    let runtime = runtime_with(EsiConfig::default(), Arc::new(ManualClock::new(1_000)));
    let path = "esi/block/t:r:m:d";
    assert_ne!(runtime.dispatch(path, &editor()).body, "replaced");

    runtime
        .registry()
        .register(ComponentDescriptor::new(BLOCK_COMPONENT, Replacement, "override"));
    runtime.flush();
    assert_eq!(runtime.dispatch(path, &editor()).body, "replaced");
}

#[test]
fn test_cookies_follow_seed_rotation() {
    let clock = Arc::new(ManualClock::new(50_000));
    let runtime = runtime_with(EsiConfig::default(), clock.clone());
    let principal = editor();

    let issued = runtime.issue_cookies(&principal).unwrap();
    let names: Vec<&str> = issued.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["ESI_ROLE", "ESI_USER", "ESI_LIVE"]);

    let jar: HashMap<String, String> = issued
        .iter()
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect();
    assert!(runtime.cookies().validate(&principal, &jar).unwrap());
    assert!(!runtime.cookies().needs_refresh(&principal, &jar).unwrap());

    // Deterministic for the same seed and principal.
    let reissued = runtime.issue_cookies(&principal).unwrap();
    assert_eq!(issued[0].value, reissued[0].value);

    clock.advance(86_400);
    assert!(runtime.run_maintenance().unwrap());
    assert!(!runtime.cookies().validate(&principal, &jar).unwrap());
    assert!(runtime.cookies().needs_refresh(&principal, &jar).unwrap());

    let revoked = runtime.revoke_cookies(&principal);
    assert_eq!(revoked.len(), 3);
    assert!(revoked.iter().all(CookieDescriptor::is_clearing));
}

#[test]
fn test_hardening_changes_names_only() {
    let clock = Arc::new(ManualClock::new(50_000));
    let plain = runtime_with(EsiConfig::default(), clock.clone());
    let mut config = EsiConfig::default();
    config.cookie.hardening = true;
    let hardened = FragmentRuntime::builder(config)
        .seed_backend(Arc::new(InMemorySeedBackend::with_seed(
            plain.seeds().get_seed().unwrap(),
        )))
        .clock(clock)
        .build()
        .unwrap();

    let principal = editor();
    let a = plain.issue_cookies(&principal).unwrap();
    let b = hardened.issue_cookies(&principal).unwrap();
    assert_eq!(a.len(), b.len());
    for (plain, hardened) in a.iter().zip(&b) {
        assert_ne!(plain.name, hardened.name);
        assert!(hardened.name.starts_with(&plain.name));
        assert_eq!(plain.value, hardened.value);
    }
}

#[test]
fn test_seed_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    let clock = Arc::new(ManualClock::new(10_000));

    let first = FragmentRuntime::builder(EsiConfig::default())
        .seed_backend(Arc::new(JsonFileSeedBackend::new(&path)))
        .clock(clock.clone())
        .build()
        .unwrap();
    let issued = first.issue_cookies(&editor()).unwrap();

    let restarted = FragmentRuntime::builder(EsiConfig::default())
        .seed_backend(Arc::new(JsonFileSeedBackend::new(&path)))
        .clock(clock)
        .build()
        .unwrap();
    let jar: HashMap<String, String> = issued
        .into_iter()
        .map(|c| (c.name, c.value))
        .collect();
    assert!(restarted.cookies().validate(&editor(), &jar).unwrap());
}

#[test]
fn test_block_settings_shape_delivery() {
    let settings = Arc::new(InMemoryBlockSettings::new());
    settings
        .save(
            "user:account",
            BlockSettings {
                render_mode: Some(SSI_MODE.to_string()),
                vary: VaryFlags::per_user(),
                ..BlockSettings::default()
            },
        )
        .unwrap();
    let runtime = FragmentRuntime::builder(EsiConfig::default())
        .component(
            BLOCK_COMPONENT,
            BlockProvider::new(Arc::new(Sidebar), settings),
            "tests",
        )
        .clock(Arc::new(ManualClock::new(1_000)))
        .build()
        .unwrap();
    let account = BlockLocation::new("bartik", "sidebar", "user", "account");

    let tag = runtime
        .embed(BLOCK_COMPONENT, &account, VaryFlags::per_user(), None, None)
        .unwrap();
    assert_eq!(
        tag,
        r#"<!--# include virtual="/esi/block/bartik:sidebar:user:account/CACHE=USER" -->"#
    );

    // A request stripped of its scope marker is still delivered as personalized.
    let response = runtime.dispatch("esi/block/bartik:sidebar:user:account", &editor());
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("Vary"), Some("Cookie"));
    assert_eq!(response.header("X-Fragment-Context"), Some("USER"));
}
