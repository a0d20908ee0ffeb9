//! Minimal IRC line parsing.
//!
//! Covers the subset of RFC 1459 framing the bot consumes: an optional
//! `:prefix`, a command word or three-digit numeric, space-separated middle
//! params and an optional `:trailing` param that may contain spaces.

/// A parsed inbound IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Origin, without the leading `:` (typically `nick!user@host` or a
    /// server name).
    pub prefix: Option<String>,
    /// Command word or numeric, as sent.
    pub command: String,
    /// Middle params followed by the trailing param, colon stripped.
    pub params: Vec<String>,
}

impl Message {
    /// Parse one raw line. Trailing CR/LF is tolerated. Returns `None` for
    /// empty or command-less lines.
    pub fn parse(line: &str) -> Option<Message> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut prefix = None;
        if let Some(tail) = rest.strip_prefix(':') {
            let (p, tail) = tail.split_once(' ')?;
            prefix = Some(p.to_string());
            rest = tail.trim_start();
        }

        let mut params = Vec::new();
        let command = match rest.split_once(' ') {
            Some((cmd, tail)) => {
                let mut tail = tail.trim_start();
                while !tail.is_empty() {
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((param, next)) => {
                            params.push(param.to_string());
                            tail = next.trim_start();
                        }
                        None => {
                            params.push(tail.to_string());
                            break;
                        }
                    }
                }
                cmd.to_string()
            }
            None => rest.to_string(),
        };

        if command.is_empty() {
            return None;
        }
        Some(Message {
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`). `None` if there is
    /// no prefix or the nick fails the 30-character sanity bound — 9 is the
    /// RFC limit but several networks allow more.
    pub fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or("");
        if nick.is_empty() || nick.len() > 30 {
            return None;
        }
        Some(nick)
    }

    /// First `#`-prefixed token among the params, if any.
    pub fn channel_param(&self) -> Option<&str> {
        self.params
            .iter()
            .map(String::as_str)
            .find(|p| p.starts_with('#'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_command_and_trailing() {
        let msg = Message::parse(":alice!a@host PRIVMSG #test :hello there\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!a@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#test", "hello there"]);
    }

    #[test]
    fn parses_bare_ping() {
        let msg = Message::parse("PING :irc.example.net").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn parses_numeric_with_middle_params() {
        let msg = Message::parse(":srv 366 shelly #test :End of /NAMES list.").unwrap();
        assert_eq!(msg.command, "366");
        assert_eq!(msg.params, vec!["shelly", "#test", "End of /NAMES list."]);
        assert_eq!(msg.channel_param(), Some("#test"));
    }

    #[test]
    fn empty_and_commandless_lines_are_none() {
        assert_eq!(Message::parse(""), None);
        assert_eq!(Message::parse("\r\n"), None);
        assert_eq!(Message::parse(":prefix-only"), None);
    }

    #[test]
    fn sender_nick_is_prefix_up_to_bang() {
        let msg = Message::parse(":bob!b@h PRIVMSG #c :hi").unwrap();
        assert_eq!(msg.sender_nick(), Some("bob"));
    }

    #[test]
    fn sender_nick_rejects_oversized_nicks() {
        let long = "x".repeat(31);
        let msg = Message::parse(&format!(":{long}!u@h PRIVMSG #c :hi")).unwrap();
        assert_eq!(msg.sender_nick(), None);
    }

    #[test]
    fn sender_nick_absent_without_prefix() {
        let msg = Message::parse("PING :x").unwrap();
        assert_eq!(msg.sender_nick(), None);
    }
}
