// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTML Pages
//!
//! Everything a browser sees: the directory manifest, the host status page, the agent page,
//! redirects left behind by migrations, and error pages. Machine-to-machine replies are plain
//! text and never pass through here.

use chrono::{DateTime, Utc};

use crate::domain::address::{Address, PeerLink};
use crate::domain::agent::{AgentName, AgentPhase, AgentState};
use crate::domain::error::FleetError;
use crate::infrastructure::wire::{reason_phrase, Response, CRLF};

const DOCTYPE: &str = "<!DOCTYPE html>";

/// Escape text for inclusion in HTML element content or a double-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn open(title: &str, extra_head: &str) -> String {
    let mut page = String::new();
    page.push_str(DOCTYPE);
    page.push_str(CRLF);
    page.push_str("<html><head>");
    page.push_str(CRLF);
    page.push_str("<meta charset=\"UTF-8\">");
    page.push_str(CRLF);
    page.push_str(extra_head);
    page.push_str(&format!("<title>{}</title>{}", escape(title), CRLF));
    page.push_str("</head><body>");
    page.push_str(CRLF);
    page
}

fn close(mut page: String) -> String {
    page.push_str("</body></html>");
    page.push_str(CRLF);
    page
}

fn link_list(entries: impl IntoIterator<Item = (String, String)>) -> String {
    let mut out = String::from("<pre>");
    out.push_str(CRLF);
    for (href, label) in entries {
        out.push_str(&format!("<a href=\"{}\">{}</a>{}", escape(&href), escape(&label), CRLF));
    }
    out.push_str("</pre>");
    out.push_str(CRLF);
    out
}

/// Directory manifest: every registered host server and every agent at its current address.
pub fn manifest(host_servers: &[Address], agents: &[(AgentName, Address)]) -> String {
    let mut page = open("Directory Manifest", "");
    page.push_str(&format!("<h1>Directory Manifest</h1>{CRLF}"));
    page.push_str(&format!("<h2>Host Servers ({})</h2>{CRLF}", host_servers.len()));
    page.push_str(&link_list(host_servers.iter().map(|a| (a.url(), a.to_string()))));
    page.push_str(&format!("<h2>Agents ({})</h2>{CRLF}", agents.len()));
    page.push_str(&link_list(
        agents
            .iter()
            .map(|(name, addr)| (addr.url(), format!("{name}  {addr}"))),
    ));
    close(page)
}

pub fn host_status(address: &Address, started_at: DateTime<Utc>, hosted: &[(AgentName, Address)]) -> String {
    let mut page = open(&format!("Host Server at {address}"), "");
    page.push_str(&format!("<h1>Host Server at {}</h1>{CRLF}", escape(&address.to_string())));
    page.push_str(&format!(
        "<p>Running since {}</p>{CRLF}",
        started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    page.push_str(&format!(
        "<p><a href=\"{}\">Create a new agent</a></p>{CRLF}",
        escape(&address.url())
    ));
    page.push_str(&format!("<h2>Hosted Agents ({})</h2>{CRLF}", hosted.len()));
    page.push_str(&link_list(
        hosted
            .iter()
            .map(|(name, addr)| (addr.url(), format!("{name}  {addr}"))),
    ));
    close(page)
}

/// Agent page with its state and the update form. `shown_at` is the address as the browser
/// reached it.
pub fn agent_page(shown_at: &Address, state: &AgentState, peer: &PeerLink, phase: AgentPhase) -> String {
    let at = escape(&shown_at.to_string());
    let mut page = open(&format!("Agent at {shown_at}"), "");
    page.push_str(&format!("<h1>Agent at {at}</h1>{CRLF}"));
    page.push_str(&format!(
        "<p>Name: <code>{}</code><br/>Phase: {}<br/>Ring peer: {}</p>{CRLF}",
        escape(state.name.as_str()),
        phase,
        escape(&peer.to_string())
    ));
    page.push_str(&format!("<h2>Agent state: {}</h2>{CRLF}", state.revision));

    let mut keys: Vec<&String> = state.contents.keys().collect();
    keys.sort();
    page.push_str("<table>");
    page.push_str(CRLF);
    for key in keys {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>{CRLF}",
            escape(key),
            escape(&state.contents[key])
        ));
    }
    page.push_str("</table>");
    page.push_str(CRLF);

    page.push_str(&format!("<form method=\"GET\" action=\"{}\">{CRLF}", escape(&shown_at.url())));
    page.push_str(&format!(
        "Enter a key or <i>migrate</i>: <input type=\"text\" name=\"input\" size=\"20\"/>{CRLF}"
    ));
    page.push_str(&format!("Value: <input type=\"text\" name=\"value\" size=\"20\"/>{CRLF}"));
    page.push_str(&format!("<input type=\"submit\" value=\"Submit\"/>{CRLF}"));
    page.push_str("</form>");
    page.push_str(CRLF);
    close(page)
}

/// Browser redirect body; the `Location` header does the real work for non-browser clients.
pub fn redirect(url: &str) -> String {
    let url = escape(url);
    let head = format!(
        "<meta http-equiv=\"refresh\" content=\"1;url={url}\">{CRLF}\
         <script type=\"text/javascript\">window.location.href = \"{url}\"</script>{CRLF}"
    );
    let mut page = open("Page Redirection", &head);
    page.push_str(&format!("<p>Moved to <a href=\"{url}\">{url}</a></p>{CRLF}"));
    close(page)
}

pub fn error(status: u16, detail: &str) -> String {
    let reason = reason_phrase(status);
    let mut page = open(&format!("{status} {reason}"), "");
    page.push_str(&format!("<h1>{reason}</h1>{CRLF}"));
    page.push_str(&format!("<p>{}</p>{CRLF}", escape(detail)));
    close(page)
}

pub fn error_response(err: &FleetError) -> Response {
    let status = err.status_code();
    Response::html(status, error(status, err.detail()))
}

pub fn redirect_response(url: String) -> Response {
    let body = redirect(&url);
    Response::redirect(url, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::summarize_body;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;'");
    }

    #[test]
    fn test_manifest_lists_hosts_and_agents() {
        let hosts = vec![Address::new("localhost", 1565)];
        let agents = vec![(AgentName::from("abc"), Address::new("localhost", 3001))];
        let page = manifest(&hosts, &agents);
        assert!(page.contains("href=\"http://localhost:1565/\""));
        assert!(page.contains("abc  localhost:3001"));
        assert!(page.contains("Agents (1)"));
    }

    #[test]
    fn test_host_status_lists_hosted_agents() {
        let started = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let hosted = vec![(AgentName::from("abc"), Address::new("localhost", 3001))];
        let page = host_status(&Address::new("localhost", 1565), started, &hosted);
        assert!(page.contains("Running since 2026-01-02 03:04:05 UTC"));
        assert!(page.contains("Hosted Agents (1)"));
        assert!(page.contains("href=\"http://localhost:3001/\""));
    }

    #[test]
    fn test_agent_page_escapes_contents() {
        let mut state = AgentState::new(AgentName::from("n"));
        state.apply_update("<k>", "v&v");
        let page = agent_page(
            &Address::new("localhost", 3001),
            &state,
            &PeerLink::new(Address::new("localhost", 3002)),
            AgentPhase::Active,
        );
        assert!(page.contains("<td>&lt;k&gt;</td><td>v&amp;v</td>"));
        assert!(page.contains("Agent state: 2"));
        assert!(page.contains("Ring peer: localhost:3002"));
    }

    #[test]
    fn test_error_response_round_trips_detail() {
        let resp = error_response(&FleetError::missing("server"));
        assert_eq!(resp.status, 400);
        assert!(resp.body.contains("<title>400 Bad Request</title>"));
        assert_eq!(summarize_body(&resp.body), "missing required parameter 'server'");
    }

    #[test]
    fn test_redirect_response() {
        let resp = redirect_response("http://localhost:3005/?input=a".to_string());
        assert!(resp.is_redirect());
        assert!(resp.body.contains("content=\"1;url=http://localhost:3005/?input=a\""));
    }
}
