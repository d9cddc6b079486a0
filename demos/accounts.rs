//! Accounts service demo: nested branches, parameter binding, ACLs and
//! introspection.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example accounts
//!
//! Try:
//!   curl http://localhost:3000/account/157 -H 'x-arbor-principal: alice'
//!   curl http://localhost:3000/account/157/domain/foobar.com -H 'x-arbor-principal: alice'
//!   curl -X POST http://localhost:3000/login -d '{"username":"alice"}'
//!   curl 'http://localhost:3000/account/%3F?verbose=1' -H 'x-arbor-principal: alice'
//!   curl -X DELETE http://localhost:3000/account/157/purge -H 'x-arbor-principal: alice'
//!   curl http://localhost:3000/_arbor/whoami -H 'x-arbor-principal: alice'

use arbor::{BoxError, Call, Config, Dispatcher, MethodSpec, Node, ParamSpec, Server};
use serde::Serialize;
use serde_json::{Value, json};

const CONFIG: &str = r##"
service_name = "accounts"

[acl]
enabled = true

[acl.rules]
alice = ["/account/*", "!/account/*/purge", "/login", "#/_arbor/whoami"]
guest = ["/login", "//?"]
"##;

#[derive(Serialize)]
struct Account {
    id: u64,
    owner: String,
}

#[tokio::main]
async fn main() -> Result<(), arbor::Error> {
    tracing_subscriber::fmt::init();

    let config = Config::from_toml_str(CONFIG)?;
    let server = Server::from_config(&config.server)?;
    let dispatcher = Dispatcher::new(service()?, config)?;

    server.serve(dispatcher).await
}

fn service() -> Result<Node, arbor::Error> {
    let domains = Node::builder("domains")
        .describe("Domains registered to an account")
        .get("/", "get_domain")
        .get("/records", "records")
        .method(
            MethodSpec::new("get_domain")
                .describe("One domain")
                .param(ParamSpec::required("account").kind("number"))
                .param(ParamSpec::required("domain").kind("string")),
            get_domain,
        )
        .method(
            MethodSpec::new("records")
                .describe("DNS records of a domain")
                .param(ParamSpec::required("domain"))
                .param(ParamSpec::with_default("type", "A").kind("string").describe("Record type")),
            records,
        )
        .method(MethodSpec::new("_fallback").describe("Unknown domain paths"), unknown)
        .build()?;

    let account = Node::builder("account")
        .describe("Customer accounts")
        .child("domains", domains)
        .route("/:account/domain/:domain", "domains")
        .get("/:account", "get")
        .delete("/:account/purge", "purge")
        .method(
            MethodSpec::new("get")
                .describe("Fetch one account")
                .param(ParamSpec::required("account").kind("number").describe("Account id"))
                .returns("Account"),
            get_account,
        )
        .method(
            MethodSpec::new("purge")
                .describe("Delete an account and everything under it")
                .param(ParamSpec::required("account").kind("number")),
            purge,
        )
        .build()?;

    Node::builder("accounts")
        .describe("Account management")
        .child("account", account)
        .route("/account", "account")
        .post("/login", "login")
        .method(
            MethodSpec::new("login")
                .describe("Start a session")
                .param(ParamSpec::required("username").kind("string"))
                .param(ParamSpec::required("password").kind("string").describe("Account password")),
            login,
        )
        .build()
}

async fn get_account(call: Call) -> Result<Account, BoxError> {
    let id: u64 = call.get("account")?.ok_or("account is bound")?;
    Ok(Account { id, owner: call.principal().unwrap_or("nobody").to_owned() })
}

async fn purge(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "purged": call.str("account") }))
}

async fn get_domain(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "account": call.str("account"), "domain": call.str("domain") }))
}

async fn records(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "domain": call.str("domain"), "type": call.arg("type"), "records": [] }))
}

async fn unknown(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "unmatched": call.unmatched(), "hint": "try /records" }))
}

async fn login(call: Call) -> Result<Value, BoxError> {
    Ok(json!({ "session": format!("session-for-{}", call.str("username").unwrap_or_default()) }))
}
