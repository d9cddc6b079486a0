use std::sync::Arc;

use arbor::{
    AccessController, BoxError, Call, Config, Dispatcher, Error, MemoryAclStore, MethodSpec, Node, Outcome,
    ParamSpec, Verb,
};
use serde_json::{Value, json};

async fn echo(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "args": call.args(), "principal": call.principal() }))
}

async fn fallback(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "unmatched": call.unmatched(), "raw": call.raw_args() }))
}

async fn failing(_call: Call) -> Result<Value, BoxError> {
    Err("backend unavailable".into())
}

fn service() -> Node {
    let domains = Node::builder("domain_service")
        .describe("Domains")
        .get("/", "get_domain")
        .method(
            MethodSpec::new("get_domain")
                .describe("One domain")
                .param(ParamSpec::required("account"))
                .param(ParamSpec::required("domain")),
            echo,
        )
        .method(MethodSpec::new("_fallback"), fallback)
        .build()
        .unwrap();

    let account = Node::builder("account")
        .describe("Accounts")
        .child("domain_service", domains)
        .route("/:account/domain/:domain", "domain_service")
        .get("/:account", "get")
        .get("/broken", "broken")
        .method(MethodSpec::new("get").describe("Fetch").param(ParamSpec::required("account")), echo)
        .method(MethodSpec::new("broken"), failing)
        .build()
        .unwrap();

    Node::builder("root")
        .child("account", account)
        .route("/account", "account")
        .post("/login", "login")
        .method(
            MethodSpec::new("login")
                .param(ParamSpec::required("username").kind("string"))
                .param(ParamSpec::required("password").kind("string").describe("Account password")),
            echo,
        )
        .build()
        .unwrap()
}

fn open() -> Dispatcher {
    Dispatcher::new(service(), Config::default()).unwrap()
}

fn guarded(rules: &[&str], tweak: impl FnOnce(&mut Config)) -> Dispatcher {
    let mut config = Config::default();
    tweak(&mut config);
    let access = AccessController::new(MemoryAclStore::new().with("bob", rules), "service");
    Dispatcher::with_access(Arc::new(service()), config, access).unwrap()
}

#[tokio::test]
async fn nested_delegation_collects_every_capture() {
    let out = open()
        .dispatch(Verb::Get.request("/account/157/domain/foobar.com"))
        .await
        .unwrap();
    assert_eq!(out.value()["args"], json!({ "account": "157", "domain": "foobar.com" }));
}

#[tokio::test]
async fn missing_password_names_the_parameter() {
    let err = open()
        .dispatch(Verb::Post.request("/login").arg("username", "bob"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "\"POST /login\" is missing the following parameters.\n* password (string): Account password"
    );
}

#[tokio::test]
async fn fallback_receives_the_unmatched_tail() {
    let out = open()
        .dispatch(Verb::Get.request("/account/1/domain/x.org/zone/file").arg("q", "1"))
        .await
        .unwrap();
    let Outcome::Fallback(value) = out else {
        panic!("expected fallback, got {out:?}");
    };
    assert_eq!(value["unmatched"], "zone/file");
    assert_eq!(value["raw"]["q"], "1");
    assert_eq!(value["raw"]["domain"], "x.org");
}

#[tokio::test]
async fn no_fallback_means_not_found() {
    let err = open().dispatch(Verb::Get.request("/nowhere")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { verb: Verb::Get, ref path } if path == "/nowhere"));
}

#[tokio::test]
async fn method_errors_pass_through() {
    let err = open().dispatch(Verb::Get.request("/account/broken")).await.unwrap_err();
    assert!(matches!(err, Error::Method(_)));
    assert_eq!(err.to_string(), "backend unavailable");
}

#[tokio::test]
async fn access_is_checked_against_the_full_path() {
    let d = guarded(&["/account/*", "!/account/*/domain"], |_| {});
    assert!(d.dispatch(Verb::Get.request("/account/1").principal("bob")).await.is_ok());

    let err = d
        .dispatch(Verb::Get.request("/account/1/domain/x.org").principal("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied { ref path } if path == "account/1/domain/x.org"));
}

#[tokio::test]
async fn anonymous_requests_use_the_anonymous_principal() {
    let mut config = Config::default();
    config.acl.enabled = true;
    config.acl.rules.insert("guest".into(), vec!["/login".into()]);
    let d = Dispatcher::new(service(), config).unwrap();

    let err = d.dispatch(Verb::Get.request("/account/1")).await.unwrap_err();
    assert!(matches!(err, Error::AccessDenied { .. }));
    let ok = d
        .dispatch(Verb::Post.request("/login").arg("username", "a").arg("password", "b"))
        .await
        .unwrap();
    assert_eq!(ok.value()["principal"], Value::Null);
}

#[tokio::test]
async fn service_identity_is_never_refused() {
    let d = guarded(&[], |_| {});
    assert!(d.dispatch(Verb::Get.request("/account/1").principal("service")).await.is_ok());
}

#[tokio::test]
async fn introspection_describes_the_branch() {
    let out = open().dispatch(Verb::Get.request("/account/?")).await.unwrap();
    let Outcome::Introspection(payload) = out else {
        panic!("expected introspection");
    };
    assert_eq!(payload["name"], "account");
    assert_eq!(payload["routes"]["/:account/domain/:domain"], "Domains");
    assert_eq!(payload["methods"]["GET"]["/:account"], "Fetch");
}

#[tokio::test]
async fn introspection_can_be_turned_off() {
    let mut config = Config::default();
    config.introspection = false;
    let d = Dispatcher::new(service(), config).unwrap();
    assert!(matches!(d.dispatch(Verb::Get.request("/?")).await, Err(Error::IntrospectionDisabled)));
}

#[tokio::test]
async fn introspection_is_access_checked_and_verbose_marks_access() {
    let d = guarded(&["/account/?", "/account/:account"], |_| {});
    let err = d.dispatch(Verb::Get.request("/?").principal("bob")).await.unwrap_err();
    assert!(matches!(err, Error::AccessDenied { .. }));

    let out = d
        .dispatch(Verb::Get.request("/account/?").principal("bob").arg("verbose", true))
        .await
        .unwrap();
    let get = &out.value()["methods"]["GET"];
    assert_eq!(get["/:account"]["accessible"], true);
    assert_eq!(get["/broken"]["accessible"], false);
}

#[tokio::test]
async fn bad_query_option_is_rejected() {
    let err = open()
        .dispatch(Verb::Get.request("/account/?").arg("hide", "nonsense!"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[tokio::test]
async fn framework_endpoints_live_under_the_namespace() {
    let out = open()
        .dispatch(Verb::Get.request("/_arbor/whoami").principal("bob"))
        .await
        .unwrap();
    assert_eq!(out.value()["principal"], "bob");

    let api = open().dispatch(Verb::Get.request("/_arbor/api")).await.unwrap();
    assert_eq!(api.value()["name"], "root");
    assert_eq!(api.value()["routes"]["/account"]["name"], "account");

    let cfg = open().dispatch(Verb::Get.request("/_arbor/config")).await.unwrap();
    assert_eq!(cfg.value()["internal_namespace"], "_arbor");
}

#[tokio::test]
async fn framework_endpoints_need_hash_rules() {
    let d = guarded(&["/*"], |_| {});
    let err = d.dispatch(Verb::Get.request("/_arbor/whoami").principal("bob")).await.unwrap_err();
    assert!(matches!(err, Error::AccessDenied { .. }));

    let d = guarded(&["#/_arbor/whoami"], |_| {});
    assert!(d.dispatch(Verb::Get.request("/_arbor/whoami").principal("bob")).await.is_ok());
}

#[tokio::test]
async fn concurrent_dispatches_share_one_tree() {
    let d = open();
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..32 {
        let d = d.clone();
        tasks.spawn(async move { d.dispatch(Verb::Get.request(format!("/account/{i}"))).await });
    }
    while let Some(res) = tasks.join_next().await {
        assert!(res.unwrap().is_ok());
    }
}
