use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::models::SessionInfo;

const STYLE: &str = r#"
body { max-width: 860px; margin: 0 auto; padding: 2rem 1.5rem; font: 16px/1.6 -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; color: #1f2328; }
header { font-size: 0.85rem; color: #59636e; border-bottom: 1px solid #d1d9e0; padding-bottom: 0.5rem; margin-bottom: 1.5rem; }
pre { background: #f6f8fa; padding: 1rem; overflow: auto; border-radius: 6px; }
code { font-family: ui-monospace, SFMono-Regular, Menlo, monospace; font-size: 0.9em; }
table { border-collapse: collapse; }
th, td { border: 1px solid #d1d9e0; padding: 0.3rem 0.8rem; }
blockquote { margin: 0; padding: 0 1rem; color: #59636e; border-left: 0.25rem solid #d1d9e0; }
#status { display: none; padding: 0.5rem 1rem; margin-bottom: 1rem; border-radius: 6px; background: #fff1e5; color: #953800; }
#status.visible { display: block; }
.waiting { color: #59636e; font-style: italic; }
"#;

// No reconnect: a closed session never returns under the same id.
const LIVE_SCRIPT: &str = r#"
(function () {
  var id = document.body.dataset.session;
  var content = document.getElementById("content");
  var status = document.getElementById("status");
  var scheme = location.protocol === "https:" ? "wss:" : "ws:";
  var socket = new WebSocket(scheme + "//" + location.host + "/?id=" + encodeURIComponent(id));

  function show(text) {
    status.textContent = text;
    status.className = "visible";
  }

  socket.onmessage = function (event) {
    var msg = JSON.parse(event.data);
    if (msg.type === "render") {
      content.innerHTML = msg.html;
      status.className = "";
    } else if (msg.type === "error") {
      show("Render failed: " + msg.message);
    } else if (msg.type === "closed") {
      show("Preview closed: " + msg.reason);
      socket.close();
    }
  };
  socket.onclose = function () {
    if (status.className !== "visible") {
      show("Disconnected from the preview server");
    }
  };
})();
"#;

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
                style { (PreEscaped(STYLE)) }
            }
            (body)
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Live view of one session, seeded with its current render
pub fn preview_page(id: &str, path: &str, rendered: Option<&str>) -> Markup {
    layout(
        file_name(path),
        html! {
            body data-session=(id) {
                header { (path) }
                div #status {}
                article #content {
                    @if let Some(rendered) = rendered {
                        (PreEscaped(rendered))
                    } @else {
                        p.waiting { "Waiting for the first render…" }
                    }
                }
                script { (PreEscaped(LIVE_SCRIPT)) }
            }
        },
    )
}

/// Every file currently under preview
pub fn index_page(sessions: &[SessionInfo]) -> Markup {
    layout(
        "livemark",
        html! {
            body {
                header { "livemark" }
                @if sessions.is_empty() {
                    p.waiting { "No files are being previewed." }
                } @else {
                    ul {
                        @for session in sessions {
                            li {
                                a href={ "/?id=" (session.id) } { (session.path) }
                            }
                        }
                    }
                }
            }
        },
    )
}

pub fn not_found_page(id: &str) -> Markup {
    layout(
        "Not found",
        html! {
            body {
                header { "livemark" }
                p { "No file is being previewed under id " code { (id) } "." }
                p { a href="/" { "Show previewed files" } }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_preview_page_embeds_render_and_id() {
        let page = preview_page("abc123", "/tmp/notes.md", Some("<h1>Hi</h1>")).into_string();
        assert!(page.contains("<title>notes.md</title>"));
        assert!(page.contains(r#"data-session="abc123""#));
        assert!(page.contains("<h1>Hi</h1>"));
    }

    #[test]
    fn test_preview_page_without_render() {
        let page = preview_page("abc123", "/tmp/notes.md", None).into_string();
        assert!(page.contains("Waiting for the first render"));
    }

    #[test]
    fn test_path_is_escaped() {
        let page = preview_page("x", "/tmp/<b>.md", None).into_string();
        assert!(page.contains("/tmp/&lt;b&gt;.md"));
    }

    #[test]
    fn test_index_lists_sessions() {
        let sessions = vec![SessionInfo {
            id: "abc".to_string(),
            path: "/tmp/a.md".to_string(),
            created_at: Utc::now(),
            subscribers: 0,
        }];
        let page = index_page(&sessions).into_string();
        assert!(page.contains(r#"href="/?id=abc""#));
        assert!(page.contains("/tmp/a.md"));
        assert!(index_page(&[]).into_string().contains("No files"));
    }
}
