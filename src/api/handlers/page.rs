use axum::extract::State;
use axum::response::Html;
use std::sync::Arc;

use crate::AppState;

const INDEX_TEMPLATE: &str = include_str!("../../../assets/index.html");

/// The browser companion page, pointed at this server's address.
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let address = state.address();
    let ip = address
        .ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    Html(render_index(&ip, address.port))
}

fn render_index(ip: &str, port: u16) -> String {
    INDEX_TEMPLATE
        .replace("{{SERVER_IP}}", ip)
        .replace("{{SERVER_PORT}}", &port.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_index_fills_address() {
        let html = render_index("192.168.1.5", 8080);
        assert!(html.contains("192.168.1.5:8080"));
        assert!(!html.contains("{{SERVER_IP}}"));
        assert!(!html.contains("{{SERVER_PORT}}"));
    }

    #[test]
    fn test_page_tells_attachments_from_data_uri_envelopes() {
        // A stored `.json` file is served as application/json too; only the
        // attachment disposition separates it from the data-URI envelope.
        assert!(INDEX_TEMPLATE.contains("response.headers.get('Content-Disposition')"));
        assert!(INDEX_TEMPLATE.contains("!disposition.startsWith('attachment')"));
        assert!(INDEX_TEMPLATE.contains("response.clone().json()"));
    }
}
