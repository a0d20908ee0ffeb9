//! The connection/session engine.
//!
//! A [`Session`] owns one TCP connection to an IRC server. It sends the
//! plaintext registration lines up front, then loops: read one line,
//! dispatch it through three handler tiers — server replies, password-gated
//! admin commands, callsign-addressed user commands — where the first tier
//! that recognizes the line acts and the rest are skipped, then run every
//! registered service once. Everything happens on a single task; handlers
//! run to completion before the next read, so no shared state needs
//! locking.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::Error;
use crate::irc::Message;
use crate::logger::TranscriptLog;
use crate::registry::{Registry, ServiceState};

/// Parting words sent with QUIT and PART.
const FAREWELL: &str = "terrapin signing off";

/// Upper bound on bytes consumed per read. Protocol lines are 512 bytes;
/// anything past this ceiling is dispatched in chunks.
const MAX_LINE: u64 = 4096;

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname; also used as the ident in USER.
    pub nick: String,
    /// Real name sent in USER.
    pub realname: String,
    /// PASS token sent during the handshake.
    pub server_password: String,
    /// Literal prefix that authorizes admin commands sent as private
    /// messages to the bot. Travels in clear text over the connection, so
    /// use a throwaway value.
    pub admin_password: String,
    /// Channel to join once the server confirms registration (001).
    pub default_channel: Option<String>,
    /// Where service replies go. When unset, falls back to the default
    /// channel, then to the last channel a user command arrived on.
    pub service_channel: Option<String>,
    /// Transcript log destination for raw inbound lines.
    pub log_path: Option<PathBuf>,
    /// Emit every inbound line at debug level instead of trace.
    pub verbose: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "terrapin".to_string(),
            realname: "terrapin bot".to_string(),
            server_password: "NOPASS".to_string(),
            admin_password: "r00t".to_string(),
            default_channel: None,
            service_channel: None,
            log_path: None,
            verbose: false,
        }
    }
}

/// A channel the server has confirmed us into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// True once the end-of-NAMES numeric confirmed membership. Channels
    /// only enter the set confirmed, so this is true for every entry.
    pub ready: bool,
}

/// What a handler tier did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// The tier consumed the line; later tiers are skipped.
    Handled,
    /// Nothing recognized; the next tier gets a look.
    Ignored,
    /// An admin quit was executed; end the session.
    Quit,
}

/// One bot session: connection state, channel set, callsigns, and the
/// extension registry.
pub struct Session {
    config: ConnectConfig,
    nick: String,
    /// Nickname we asked the server for but that is not yet confirmed.
    pending_nick: Option<String>,
    callsigns: Vec<String>,
    channels: Vec<Channel>,
    /// Last channel a user command arrived on; fallback service target.
    last_active: Option<String>,
    registry: Registry,
    log: TranscriptLog,
}

impl Session {
    pub fn new(config: ConnectConfig) -> Self {
        let nick = config.nick.clone();
        let callsigns = callsigns_for(&nick);
        Self {
            config,
            nick,
            pending_nick: None,
            callsigns,
            channels: Vec::new(),
            last_active: None,
            registry: Registry::default(),
            log: TranscriptLog::disabled(),
        }
    }

    /// Register a command; see [`Registry::register_command`].
    pub fn register_command<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[String]) -> Option<String> + Send + 'static,
    {
        self.registry.register_command(name, handler);
    }

    /// Register a service; see [`Registry::register_service`].
    pub fn register_service<F>(&mut self, name: impl Into<String>, slot_count: usize, handler: F)
    where
        F: FnMut(&mut ServiceState) -> Option<String> + Send + 'static,
    {
        self.registry.register_service(name, slot_count, handler);
    }

    /// Current nickname. Changes only after the server confirms a NICK
    /// request.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Channels the server has confirmed us into, in join order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dial the server and run the session until the connection closes.
    pub async fn run(&mut self) -> Result<(), Error> {
        let addr = self.config.server_addr.clone();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        tracing::info!(%addr, nick = %self.nick, "connected");
        let (reader, writer) = tokio::io::split(stream);
        self.run_with_stream(BufReader::new(reader), writer).await
    }

    /// Run the session over an already-established stream. This is the
    /// seam integration tests drive with an in-memory duplex.
    pub async fn run_with_stream<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<(), Error>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if let Some(path) = self.config.log_path.clone() {
            self.log = TranscriptLog::open(&path).await;
        }

        // Mandatory registration lines; no acknowledgement is waited for.
        send_line(&mut writer, &format!("PASS {}", self.config.server_password)).await;
        send_line(&mut writer, &format!("NICK {}", self.nick)).await;
        send_line(
            &mut writer,
            &format!("USER {} 0 * :{}", self.nick, self.config.realname),
        )
        .await;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            // One line per iteration, with a hard ceiling on bytes consumed
            // per read: a server streaming bytes without a newline arrives
            // as MAX_LINE-sized chunks instead of growing the buffer.
            let n = (&mut reader)
                .take(MAX_LINE)
                .read_until(b'\n', &mut buf)
                .await?;
            if n == 0 {
                tracing::info!("connection closed by server");
                break;
            }
            let lossy = String::from_utf8_lossy(&buf);
            let raw = lossy.trim_end_matches(['\r', '\n']);

            self.log.record(raw).await;
            if self.config.verbose {
                tracing::debug!(line = %raw, "recv");
            } else {
                tracing::trace!(line = %raw, "recv");
            }

            let outcome = match Message::parse(raw) {
                Some(msg) => {
                    // Side-check: runs alongside whatever tier matches below.
                    self.note_nick_confirmation(&msg);

                    match self.handle_server_reply(&msg, &mut writer).await {
                        Dispatch::Ignored => {
                            match self.handle_admin_command(&msg, &mut writer).await {
                                Dispatch::Ignored => {
                                    self.handle_user_message(&msg, &mut writer).await
                                }
                                other => other,
                            }
                        }
                        other => other,
                    }
                }
                None => Dispatch::Ignored,
            };

            let replies = self.registry.tick_services();
            if !replies.is_empty() {
                match self.service_target() {
                    Some(target) => {
                        for reply in replies {
                            send_line(&mut writer, &format!("PRIVMSG {target} :{reply}")).await;
                        }
                    }
                    None => tracing::trace!("service reply dropped, no target channel"),
                }
            }

            // Services get their tick for the quit iteration before the
            // loop ends; the farewell is already on the wire.
            if outcome == Dispatch::Quit {
                break;
            }
        }
        Ok(())
    }

    // ── Tier 1: server-originated control messages ──

    async fn handle_server_reply<W: AsyncWrite + Unpin>(
        &mut self,
        msg: &Message,
        writer: &mut W,
    ) -> Dispatch {
        match msg.command.as_str() {
            // Keepalive: echo the payload back verbatim.
            "PING" => {
                let payload = msg.params.first().map(String::as_str).unwrap_or("");
                send_line(writer, &format!("PONG :{payload}")).await;
                Dispatch::Handled
            }
            // RPL_WELCOME: registration went through, join the configured
            // channel.
            "001" => match self.config.default_channel.clone() {
                Some(chan) => {
                    send_line(writer, &format!("JOIN {chan}")).await;
                    Dispatch::Handled
                }
                None => Dispatch::Ignored,
            },
            // RPL_ENDOFNAMES: the join completed server-side.
            "366" => match msg.channel_param() {
                Some(chan) => {
                    let chan = chan.to_string();
                    self.add_channel(&chan);
                    Dispatch::Handled
                }
                None => Dispatch::Ignored,
            },
            _ => Dispatch::Ignored,
        }
    }

    /// While a nick change is in flight, watch for the server's NICK
    /// confirmation. Never consumes the line.
    fn note_nick_confirmation(&mut self, msg: &Message) {
        let Some(pending) = self.pending_nick.clone() else {
            return;
        };
        if msg.command == "NICK" && msg.params.first().is_some_and(|n| *n == pending) {
            tracing::info!(old = %self.nick, new = %pending, "nick change confirmed");
            self.nick = pending;
            self.callsigns = callsigns_for(&self.nick);
            self.pending_nick = None;
        }
    }

    fn add_channel(&mut self, name: &str) {
        // A channel name appears at most once in the set.
        if self.channels.iter().any(|c| c.name == name) {
            return;
        }
        tracing::info!(channel = %name, "join confirmed");
        self.channels.push(Channel {
            name: name.to_string(),
            ready: true,
        });
    }

    // ── Tier 2: password-gated admin commands ──

    async fn handle_admin_command<W: AsyncWrite + Unpin>(
        &mut self,
        msg: &Message,
        writer: &mut W,
    ) -> Dispatch {
        if msg.command != "PRIVMSG" || msg.params.len() < 2 || msg.params[0] != self.nick {
            return Dispatch::Ignored;
        }
        if self.config.admin_password.is_empty() {
            return Dispatch::Ignored;
        }
        // Literal prefix gate: without the password the text never reaches
        // command classification.
        let Some(rest) = msg.params[1].strip_prefix(&self.config.admin_password) else {
            return Dispatch::Ignored;
        };
        let rest = rest.trim();

        let mut words = rest.split_whitespace();
        match words.next() {
            // The no-argument command is the entire remainder; trailing
            // text falls through unhandled.
            Some("!quit") if rest == "!quit" => {
                send_line(writer, &format!("QUIT :{FAREWELL}")).await;
                Dispatch::Quit
            }
            Some("!nick") => {
                let Some(new_nick) = words.next() else {
                    return Dispatch::Ignored;
                };
                send_line(writer, &format!("NICK {new_nick}")).await;
                // The active nick stays until the server confirms.
                self.pending_nick = Some(new_nick.to_string());
                Dispatch::Handled
            }
            Some("!join") => {
                let Some(chan) = words.next().filter(|c| c.starts_with('#')) else {
                    return Dispatch::Ignored;
                };
                // The channel enters the set only once 366 confirms it.
                let line = match words.next() {
                    Some(key) => format!("JOIN {chan} {key}"),
                    None => format!("JOIN {chan}"),
                };
                send_line(writer, &line).await;
                Dispatch::Handled
            }
            Some("!part") => {
                let Some(chan) = words.next().filter(|c| c.starts_with('#')) else {
                    return Dispatch::Ignored;
                };
                match self.channels.iter().position(|c| c.name == chan) {
                    Some(idx) => {
                        self.channels.remove(idx);
                        send_line(writer, &format!("PART {chan} :{FAREWELL}")).await;
                        Dispatch::Handled
                    }
                    None => {
                        tracing::error!(channel = %chan, "cannot part unknown channel");
                        Dispatch::Ignored
                    }
                }
            }
            _ => Dispatch::Ignored,
        }
    }

    // ── Tier 3: callsign-addressed user commands ──

    async fn handle_user_message<W: AsyncWrite + Unpin>(
        &mut self,
        msg: &Message,
        writer: &mut W,
    ) -> Dispatch {
        if msg.command != "PRIVMSG" || msg.params.len() < 2 {
            return Dispatch::Ignored;
        }
        let target = &msg.params[0];
        let text = &msg.params[1];
        let Some(chan) = self
            .channels
            .iter()
            .find(|c| c.ready && c.name.eq_ignore_ascii_case(target))
            .map(|c| c.name.clone())
        else {
            return Dispatch::Ignored;
        };

        for callsign in self.callsigns.clone() {
            let Some(rest) = strip_prefix_ci(text, &callsign) else {
                continue;
            };
            let rest = rest.trim();
            self.last_active = Some(chan.clone());

            if rest.eq_ignore_ascii_case("commands") {
                let names = self.registry.command_names().join(", ");
                send_line(writer, &format!("PRIVMSG {chan} :Available commands: {names}")).await;
            } else if rest.eq_ignore_ascii_case("version") {
                send_line(
                    writer,
                    &format!("PRIVMSG {chan} :[running terrapin {}]", env!("CARGO_PKG_VERSION")),
                )
                .await;
            } else {
                self.invoke_extension(msg, &chan, rest, writer).await;
            }
            // First callsign match wins, whether or not the command existed.
            return Dispatch::Handled;
        }
        Dispatch::Ignored
    }

    /// Comma-split the text into command name and positional arguments,
    /// then hand off to the registry. Unknown names stay silent.
    async fn invoke_extension<W: AsyncWrite + Unpin>(
        &self,
        msg: &Message,
        chan: &str,
        text: &str,
        writer: &mut W,
    ) {
        let sender = msg.sender_nick().unwrap_or("");
        let mut parts = text.split(',').map(|p| p.trim().to_string());
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.collect();

        if let Some(reply) = self.registry.invoke(&name, &args)
            && !reply.is_empty()
        {
            send_line(writer, &format!("PRIVMSG {chan} :{sender}: {reply}")).await;
        }
    }

    /// Target channel for service replies: explicit config first, then the
    /// default channel, then the last channel a user command arrived on.
    fn service_target(&self) -> Option<String> {
        self.config
            .service_channel
            .clone()
            .or_else(|| self.config.default_channel.clone())
            .or_else(|| self.last_active.clone())
    }
}

/// Callsigns derived from a nickname, used to address the bot in channels.
fn callsigns_for(nick: &str) -> Vec<String> {
    vec![format!("{nick}, "), format!("{nick}: ")]
}

/// Case-insensitive prefix strip. ASCII case only, which is what IRC nicks
/// use.
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() < prefix.len() || !text.is_char_boundary(prefix.len()) {
        return None;
    }
    if text[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Reliable full-buffer send with CRLF framing. `write_all` completes short
/// writes; a hard failure abandons the line and is only reported here — a
/// dead connection surfaces as EOF on the next read.
async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) {
    let framed = format!("{line}\r\n");
    if let Err(e) = writer.write_all(framed.as_bytes()).await {
        tracing::error!(error = %e, line, "send failed");
        return;
    }
    if let Err(e) = writer.flush().await {
        tracing::error!(error = %e, "flush failed");
        return;
    }
    tracing::debug!(%line, "sent");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callsigns_follow_the_nick() {
        assert_eq!(callsigns_for("shelly"), vec!["shelly, ", "shelly: "]);
    }

    #[test]
    fn strip_prefix_ci_matches_any_case() {
        assert_eq!(strip_prefix_ci("Shelly, echo,hi", "shelly, "), Some("echo,hi"));
        assert_eq!(strip_prefix_ci("SHELLY: hi", "shelly: "), Some("hi"));
        assert_eq!(strip_prefix_ci("nope", "shelly, "), None);
    }

    #[test]
    fn strip_prefix_ci_survives_multibyte_text() {
        // Prefix length lands mid-codepoint; must not panic.
        assert_eq!(strip_prefix_ci("ääää", "shelly, "), None);
    }

    #[tokio::test]
    async fn admin_tier_ignores_messages_without_the_password() {
        let mut session = Session::new(ConnectConfig::default());
        session.add_channel("#test");
        let msg = Message::parse(":eve!e@h PRIVMSG terrapin :wrong !part #test").unwrap();
        let outcome = session
            .handle_admin_command(&msg, &mut tokio::io::sink())
            .await;
        assert_eq!(outcome, Dispatch::Ignored);
        assert_eq!(session.channels().len(), 1);
    }

    #[tokio::test]
    async fn admin_tier_ignores_channel_messages() {
        let mut session = Session::new(ConnectConfig::default());
        let msg = Message::parse(":eve!e@h PRIVMSG #test :r00t !quit").unwrap();
        let outcome = session
            .handle_admin_command(&msg, &mut tokio::io::sink())
            .await;
        assert_eq!(outcome, Dispatch::Ignored);
    }

    #[tokio::test]
    async fn join_confirmation_is_idempotent() {
        let mut session = Session::new(ConnectConfig::default());
        let msg = Message::parse(":srv 366 terrapin #test :End of /NAMES list.").unwrap();
        for _ in 0..2 {
            let outcome = session
                .handle_server_reply(&msg, &mut tokio::io::sink())
                .await;
            assert_eq!(outcome, Dispatch::Handled);
        }
        assert_eq!(session.channels(), &[Channel {
            name: "#test".to_string(),
            ready: true,
        }]);
    }

    #[test]
    fn service_target_prefers_explicit_then_default_then_last_active() {
        let mut session = Session::new(ConnectConfig {
            service_channel: Some("#svc".into()),
            default_channel: Some("#main".into()),
            ..Default::default()
        });
        session.last_active = Some("#recent".into());
        assert_eq!(session.service_target(), Some("#svc".to_string()));

        session.config.service_channel = None;
        assert_eq!(session.service_target(), Some("#main".to_string()));

        session.config.default_channel = None;
        assert_eq!(session.service_target(), Some("#recent".to_string()));

        session.last_active = None;
        assert_eq!(session.service_target(), None);
    }
}
