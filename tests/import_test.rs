//! Import/reference integration tests: documents referencing each other,
//! scoped variables and resolution failures.

mod support;

use std::sync::Arc;

use httpfile::config::RequestOverrides;
use httpfile::parser::parse;
use httpfile::resolve::ResolveError;
use httpfile::runner::SendOptions;
use httpfile::transport::amqp::AmqpClient;
use httpfile::transport::HttpClient;
use httpfile::{Error, Runner};
use pretty_assertions::assert_eq;
use support::{FakeExchange, MemoryLoader};

fn runner(loader: MemoryLoader, exchange: &Arc<FakeExchange>) -> Runner {
    support::init_tracing();
    let http = HttpClient::new(RequestOverrides::default(), exchange.clone());
    Runner::with_clients(Arc::new(loader), http, AmqpClient::default()).unwrap()
}

#[tokio::test]
async fn referenced_request_runs_first_and_feeds_variables() {
    let loader = MemoryLoader::new([(
        "import.http",
        "\n# @name foo\nGET  http://localhost:8008/json\n",
    )]);
    let exchange = FakeExchange::with_routes(vec![(
        "GET",
        "http://localhost:8008/json",
        r#"{"foo":"bar","test":1}"#,
    )]);
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "\n# @import ./import.http\n###\n# @ref foo\nPOST http://localhost:8008/post?test={{foo.test}}\n\nfoo={{foo.foo}}\n",
    );
    runner.send(&mut document, 1).await.unwrap();

    let seen = exchange.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].url, "http://localhost:8008/json");
    assert_eq!(seen[1].url, "http://localhost:8008/post?test=1");
    assert_eq!(seen[1].body.as_deref(), Some("foo=bar"));
    assert!(document.regions[1].response.is_some());
}

#[tokio::test]
async fn imported_global_variables_resolve() {
    let loader = MemoryLoader::new([("import.http", "\n@foo=bar\n@bar=foo\n")]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./import.http\nPOST http://localhost:8008/post?foo={{foo}}\n\nbar={{bar}}\n",
    );
    runner.send(&mut document, 0).await.unwrap();

    let seen = exchange.seen();
    assert_eq!(seen[0].url, "http://localhost:8008/post?foo=bar");
    assert_eq!(seen[0].body.as_deref(), Some("bar=foo"));
}

#[tokio::test]
async fn reference_by_meta_tag_imports_scoped_variables() {
    let loader = MemoryLoader::new([("import.http", "###\n# @test\n@foo=bar\n@bar=foo\n")]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./import.http\n# @ref test\nPOST http://localhost:8008/post?foo={{foo}}\n\nbar={{bar}}\n",
    );
    runner.send(&mut document, 0).await.unwrap();

    let seen = exchange.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "http://localhost:8008/post?foo=bar");
    assert_eq!(seen[0].body.as_deref(), Some("bar=foo"));
}

#[tokio::test]
async fn force_ref_bypasses_selection_filter_and_host_applies() {
    let loader = MemoryLoader::new([(
        "import.http",
        "@host=http://localhost:8008\n\n### Apple\n# @name send_apple\nPOST /anything\nContent-Type: application/json\n\n{\n  \"id\": \"0001\"\n}\n",
    )]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./import.http\n\n###\n# @forceRef send_apple\n",
    );
    let options = SendOptions {
        name_filter: Some(vec!["something-else".to_string()]),
    };
    runner
        .send_with_options(&mut document, 1, &options)
        .await
        .unwrap();

    let seen = exchange.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].url, "http://localhost:8008/anything");
    assert_eq!(seen[0].body.as_deref(), Some("{\n  \"id\": \"0001\"\n}"));
    assert!(seen[0]
        .headers
        .iter()
        .any(|(name, value)| name.eq_ignore_ascii_case("content-type")
            && value == "application/json"));
}

#[tokio::test]
async fn plain_ref_is_skipped_by_selection_filter() {
    let loader = MemoryLoader::new([(
        "import.http",
        "# @name foo\nGET http://localhost:8008/json\n",
    )]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./import.http\n###\n# @ref foo\nPOST http://localhost:8008/post\n",
    );
    let options = SendOptions {
        name_filter: Some(vec!["nope".to_string()]),
    };
    runner
        .send_with_options(&mut document, 1, &options)
        .await
        .unwrap();

    let seen = exchange.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "POST");
}

#[tokio::test]
async fn diamond_imports_resolve_a_unique_reference() {
    // common.http is reachable through both a.http and b.http; its named
    // region must still count as exactly one match.
    let loader = MemoryLoader::new([
        ("a.http", "# @import ./common.http\n"),
        ("b.http", "# @import ./common.http\n"),
        ("common.http", "# @name foo\nGET http://localhost:8008/json\n"),
    ]);
    let exchange = FakeExchange::with_routes(vec![(
        "GET",
        "http://localhost:8008/json",
        r#"{"foo":"bar"}"#,
    )]);
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./a.http\n# @import ./b.http\n###\n# @ref foo\nPOST http://localhost:8008/post?foo={{foo.foo}}\n",
    );
    runner.send(&mut document, 1).await.unwrap();

    let seen = exchange.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].url, "http://localhost:8008/json");
    assert_eq!(seen[1].url, "http://localhost:8008/post?foo=bar");
}

#[tokio::test]
async fn meta_tag_region_variables_stay_out_of_global_scope() {
    let loader = MemoryLoader::new([("import.http", "###\n# @test\n@foo=bar\n")]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    // No `@ref test`, so the tag-scoped assignment must not be visible.
    let mut document = parse(
        "main.http",
        "# @import ./import.http\nPOST http://localhost:8008/post?foo={{foo}}\n",
    );
    runner.send(&mut document, 0).await.unwrap();

    let seen = exchange.seen();
    assert_eq!(seen[0].url, "http://localhost:8008/post?foo={{foo}}");
}

#[tokio::test]
async fn import_cycle_is_a_hard_error() {
    let loader = MemoryLoader::new([("a.http", "# @import ./main.http\n@x=1\n")]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./a.http\nGET http://localhost:8008/json\n",
    );
    let error = runner.send(&mut document, 0).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Resolve(ResolveError::ImportCycle { .. })
    ));
    assert_eq!(exchange.calls(), 0);
}

#[tokio::test]
async fn unresolved_reference_is_a_hard_error() {
    let loader = MemoryLoader::empty();
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse("main.http", "# @ref nope\nGET http://localhost:8008/json\n");
    let error = runner.send(&mut document, 0).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Resolve(ResolveError::UnresolvedReference { ref name }) if name == "nope"
    ));
}

#[tokio::test]
async fn unresolved_import_is_a_hard_error() {
    let loader = MemoryLoader::empty();
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./missing.http\nGET http://localhost:8008/json\n",
    );
    let error = runner.send(&mut document, 0).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Resolve(ResolveError::UnresolvedImport { .. })
    ));
}

#[tokio::test]
async fn ambiguous_reference_is_a_hard_error() {
    let loader = MemoryLoader::new([(
        "import.http",
        "# @name foo\nGET http://localhost:8008/other\n",
    )]);
    let exchange = FakeExchange::new(|_, _, _| support::FakeReply::default());
    let runner = runner(loader, &exchange);

    let mut document = parse(
        "main.http",
        "# @import ./import.http\n\n###\n# @name foo\nGET http://localhost:8008/json\n\n###\n# @ref foo\nPOST http://localhost:8008/post\n",
    );
    let error = runner.send(&mut document, 2).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Resolve(ResolveError::AmbiguousReference { ref name }) if name == "foo"
    ));
}
