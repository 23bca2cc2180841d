//! `testboard watch` -- terminal viewer for a running server.

use futures::StreamExt;
use testboard_view::{
    render_loading, render_notice, render_summary, render_table, DateFormatter, Notice, Reconciler,
};
use time::UtcOffset;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connect to `url` and print every snapshot as it arrives.
///
/// Losing the connection is not an error: the last view stays on screen.
pub(crate) async fn cmd_watch(url: &str, utc: bool, once: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dates = if utc {
        DateFormatter::new(UtcOffset::UTC)
    } else {
        DateFormatter::local()
    };
    let mut reconciler = Reconciler::new(dates);
    print!("{}", render_loading());

    let (mut socket, _) = connect_async(url).await?;
    tracing::info!(url, "connected");

    while let Some(msg) = socket.next().await {
        match msg {
            Ok(Message::Text(text)) => match reconciler.apply_frame(text.as_str()) {
                Ok(notice) => {
                    print_view(&reconciler, &notice);
                    if once {
                        let _ = socket.close(None).await;
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ignoring frame"),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                if reason.is_empty() {
                    println!("connection closed; showing last received data");
                } else {
                    println!("connection closed ({}); showing last received data", reason);
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                println!("connection lost ({}); showing last received data", e);
                break;
            }
        }
    }
    if reconciler.is_loading() {
        print!("{}", render_loading());
    }
    Ok(())
}

fn print_view(reconciler: &Reconciler, notice: &Notice) {
    let Some(state) = reconciler.state() else {
        return;
    };
    print!("{}", render_notice(notice));
    print!("{}", render_summary(&state.summary()));
    print!("{}", render_table(state));
    println!();
}
