// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line tool running a request given on the command line through the token modifier and
//! printing the result.

use clap::Parser;
use log::error;
use pingora_http::RequestHeader;
use std::path::PathBuf;
use token_modifier_module::configuration::{TokenModifierConf, TokenModifierOpt};
use token_modifier_module::{ListedRule, MutableRequest, TokenModifier};

/// Apply token modification rules to a request and print the modified request
#[derive(Debug, Parser)]
#[command(version)]
struct Opt {
    /// Configuration files to load
    #[arg(short, long)]
    conf: Vec<PathBuf>,

    #[command(flatten)]
    token_modifier: TokenModifierOpt,

    /// HTTP method of the request
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header in the format `Name: value`, can be specified multiple times
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(long)]
    body: Option<String>,

    /// Print the configured rules instead of processing a request
    #[arg(long)]
    list_rules: bool,

    /// Request path and query string, e.g. `/api?token=abc`
    #[arg(default_value = "/")]
    target: String,
}

fn print_rule(listed: &ListedRule) {
    let rule = &listed.rule;
    println!(
        "[{}] {} ({} {:?} -> {:?}) {}",
        if rule.is_enabled() { "x" } else { " " },
        listed.id,
        rule.action(),
        rule.pattern().as_str(),
        rule.value(),
        rule.description()
    );
}

fn print_request(request: &RequestHeader, body: Option<&[u8]>) {
    println!("{} {}", request.method, request.uri);
    for name in request.header_names() {
        for value in request.header_values(&name) {
            println!("{name}: {value}");
        }
    }
    if let Some(body) = body {
        println!();
        println!("{}", String::from_utf8_lossy(body));
    }
}

fn main() {
    env_logger::init();

    let opt = Opt::parse();

    let mut conf = match TokenModifierConf::load_from_files(&opt.conf) {
        Ok(conf) => conf,
        Err(err) => {
            error!("{err}");
            return;
        }
    };
    conf.merge_with_opt(opt.token_modifier);

    let modifier = match TokenModifier::try_from(conf) {
        Ok(modifier) => modifier,
        Err(err) => {
            error!("{err}");
            return;
        }
    };

    if opt.list_rules {
        for listed in modifier.list_rules() {
            print_rule(&listed);
        }
        return;
    }

    let mut request =
        match RequestHeader::build(opt.method.as_str(), opt.target.as_bytes(), None) {
            Ok(request) => request,
            Err(err) => {
                error!("Invalid request: {err}");
                return;
            }
        };

    for header in &opt.headers {
        let Some((name, value)) = header.split_once(':') else {
            error!("Invalid header {header:?}, expected `Name: value`");
            return;
        };
        if let Err(err) = request.append_header(name.trim().to_owned(), value.trim()) {
            error!("Invalid header {header:?}: {err}");
            return;
        }
    }

    let mut body = opt.body.map(String::into_bytes);
    if let Some(body) = &body {
        if let Err(err) = request.insert_header("Content-Length", body.len()) {
            error!("Failed setting Content-Length header: {err}");
            return;
        }
    }

    modifier.modify_request(&mut request);
    if let Some(body) = &mut body {
        modifier.modify_body(&mut request, body);
    }

    print_request(&request, body.as_deref());
}
