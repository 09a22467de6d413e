//! `test-utils` is used for testing in both `drip-lib` and `drip-bin`.
//! This crate does not depend on `drip-lib` or `drip-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status when
/// handling a matching request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock web server that answers every `GET` with `200 OK` and
/// verifies on drop that it received exactly `$count` requests
#[macro_export]
macro_rules! counting_mock_server {
    ($count:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(http::StatusCode::OK))
            .expect($count)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Turn a mock server into a request template, with the request index
/// as the last path segment
#[macro_export]
macro_rules! template_for {
    ($server:expr) => {
        format!("{}/{{}}", $server.uri())
    };
}

/// Gets the "main" binary name (e.g. `drip`)
#[macro_export]
macro_rules! main_command {
    () => {
        Command::cargo_bin("drip").expect("Couldn't get drip binary")
    };
}
