// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use snafu::{OptionExt, ResultExt};

use crate::load_balance::{LoadBalance, Loadbalancer};
use crate::options::ConnectionOptions;
use crate::{error, Result};

/// Properties consumed by the client instead of being sent as server settings
pub const SOCKET_TIMEOUT: &str = "socket_timeout";
pub const SSL: &str = "ssl";

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";
const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// Credentials sent with every request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

/// HTTP client shared by every database handle created from it
#[derive(Clone, Debug, Default)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_urls<U, A>(urls: A) -> Self
    where
        U: AsRef<str>,
        A: AsRef<[U]>,
    {
        let client = Self::new();
        client.start(urls);
        client
    }

    /// Build a client for the configured peers, honoring `socket_timeout`
    /// (milliseconds) and `ssl` properties.
    pub fn with_options(options: &ConnectionOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.property(SOCKET_TIMEOUT) {
            let millis: u64 = timeout.trim().parse().ok().context(
                error::InvalidConfigValueSnafu {
                    key: format!("clickhouse.{SOCKET_TIMEOUT}"),
                    msg: format!("expected milliseconds, got {timeout}"),
                },
            )?;
            builder = builder.timeout(Duration::from_millis(millis));
        }
        let http = builder.build().context(error::HttpSnafu)?;

        let scheme = match options.property(SSL) {
            Some(ssl) if ssl.eq_ignore_ascii_case("true") => "https",
            _ => "http",
        };

        let inner = Inner {
            http,
            scheme,
            ..Default::default()
        };
        inner.set_peers(options.hosts.clone());
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn start<U, A>(&self, urls: A)
    where
        U: AsRef<str>,
        A: AsRef<[U]>,
    {
        let urls: Vec<String> = urls
            .as_ref()
            .iter()
            .map(|peer| peer.as_ref().to_string())
            .collect();

        self.inner.set_peers(urls);
    }

    pub fn find_peer(&self) -> Result<String> {
        self.inner
            .get_peer()
            .context(error::IllegalClientStateSnafu {
                err_msg: "No available peer found",
            })
    }

    /// POST `sql` to `peer`, returning the response body.
    ///
    /// A failed response becomes `Server` when ClickHouse reported an error
    /// code and `UnknownServer` otherwise.
    pub async fn execute(
        &self,
        peer: &str,
        database: &str,
        auth: Option<&Auth>,
        settings: &[(String, String)],
        sql: String,
    ) -> Result<String> {
        let url = format!("{}://{}/", self.inner.scheme, peer);
        let mut request = self
            .inner
            .http
            .post(url)
            .query(&[("database", database)])
            .query(settings)
            .body(sql);
        if let Some(auth) = auth {
            request = request
                .header(USER_HEADER, &auth.username)
                .header(KEY_HEADER, &auth.password);
        }

        let response = request.send().await.context(error::HttpSnafu)?;
        let status = response.status();
        let header_code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i32>().ok());
        let body = response.text().await.context(error::HttpSnafu)?;

        if status.is_success() {
            return Ok(body);
        }

        match parse_exception(&body) {
            Some((code, msg)) => error::ServerSnafu {
                code: header_code.unwrap_or(code),
                msg,
            }
            .fail(),
            None => match header_code {
                Some(code) => error::ServerSnafu {
                    code,
                    msg: body.trim(),
                }
                .fail(),
                None => error::UnknownServerSnafu {
                    status: status.as_u16(),
                    msg: body.trim(),
                }
                .fail(),
            },
        }
    }
}

/// Split a ClickHouse exception body `Code: 1002. DB::Exception: ...` into
/// its code and message.
pub fn parse_exception(body: &str) -> Option<(i32, String)> {
    let rest = body.trim().strip_prefix("Code:")?.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let code = rest[..digits].parse().ok()?;
    let msg = rest[digits..]
        .trim_start_matches('.')
        .trim()
        .to_string();
    Some((code, msg))
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    scheme: &'static str,
    peers: RwLock<Vec<String>>,
    load_balance: Loadbalancer,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            scheme: "http",
            peers: RwLock::default(),
            load_balance: Loadbalancer::default(),
        }
    }
}

impl Inner {
    fn set_peers(&self, peers: Vec<String>) {
        let mut guard = self.peers.write();
        *guard = peers;
    }

    fn get_peer(&self) -> Option<String> {
        let guard = self.peers.read();
        self.load_balance.get_peer(&guard).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exception() {
        let body = "Code: 1002. DB::Exception: Connection reset (version 23.8.1.1)\n";
        let (code, msg) = parse_exception(body).unwrap();
        assert_eq!(code, 1002);
        assert_eq!(msg, "DB::Exception: Connection reset (version 23.8.1.1)");

        assert_eq!(
            parse_exception("Code: 60, e.displayText() = DB::Exception: Table default.x doesn't exist")
                .map(|(code, _)| code),
            Some(60)
        );
        assert!(parse_exception("502 Bad Gateway").is_none());
        assert!(parse_exception("Code: oops").is_none());
    }

    #[test]
    fn test_find_peer() {
        let client = Client::new();
        assert!(client.find_peer().is_err());

        let client = Client::with_urls(["ch1:8123"]);
        assert_eq!(client.find_peer().unwrap(), "ch1:8123");
    }

    #[test]
    fn test_with_options() {
        let options = ConnectionOptions::builder()
            .hosts(vec!["ch1:8443".to_string(), "ch2:8443".to_string()])
            .database("default")
            .username("default")
            .password("")
            .properties(vec![
                (SOCKET_TIMEOUT.to_string(), "50000".to_string()),
                (SSL.to_string(), "true".to_string()),
            ])
            .build()
            .unwrap();

        let client = Client::with_options(&options).unwrap();
        assert_eq!(client.inner.scheme, "https");
        assert!(client.find_peer().unwrap().starts_with("ch"));

        let options = ConnectionOptions {
            properties: vec![(SOCKET_TIMEOUT.to_string(), "soon".to_string())],
            ..options
        };
        assert!(Client::with_options(&options).is_err());
    }
}
