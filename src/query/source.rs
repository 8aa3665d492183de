//! Source engine server query (A2S) over UDP.
//!
//! Sends `A2S_INFO` and then `A2S_PLAYER`, answering `S2C_CHALLENGE` where the
//! server asks for it. Split (multi-packet) responses are not supported.

use async_trait::async_trait;
use serde_json::{json, Map};
use std::time::Duration;
use tokio::net::UdpSocket;

use super::{PlayerInfo, QueryError, QueryResponse, RawGameIds, ServerQuery};

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const SPLIT_HEADER: [u8; 4] = [0xFE, 0xFF, 0xFF, 0xFF];

const A2S_INFO: u8 = 0x54;
const A2S_PLAYER: u8 = 0x55;
const S2A_INFO: u8 = 0x49;
const S2A_INFO_GOLDSRC: u8 = 0x6D;
const S2A_PLAYER: u8 = 0x44;
const S2C_CHALLENGE: u8 = 0x41;

/// App id of The Ship, which inserts extra fields into `S2A_INFO`.
const THE_SHIP_APP_ID: u16 = 2400;

/// Extra data flag: game port follows.
const EDF_PORT: u8 = 0x80;

/// A2S client with a per-exchange timeout.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    timeout: Duration,
}

impl SourceQuery {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, socket: &UdpSocket, request: &[u8]) -> Result<Vec<u8>, QueryError> {
        socket
            .send(request)
            .await
            .map_err(|e| QueryError::Network(format!("failed to send: {}", e)))?;

        let mut buf = vec![0u8; 1400];
        let n = match tokio::time::timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(QueryError::Network(format!("failed to recv: {}", e))),
            Err(_) => return Err(QueryError::Timeout(self.timeout)),
        };
        buf.truncate(n);

        if buf.len() >= 4 && buf[..4] == SPLIT_HEADER {
            return Err(QueryError::Protocol(
                "split responses are not supported".to_string(),
            ));
        }
        if buf.len() < 5 || buf[..4] != SIMPLE_HEADER {
            return Err(QueryError::Protocol(format!(
                "unexpected response header ({} bytes)",
                buf.len()
            )));
        }

        Ok(buf)
    }

    async fn info(&self, socket: &UdpSocket) -> Result<ServerInfo, QueryError> {
        let mut request = build_info_request(None);
        let mut response = self.exchange(socket, &request).await?;

        if response[4] == S2C_CHALLENGE {
            let challenge = read_challenge(&response)?;
            request = build_info_request(Some(challenge));
            response = self.exchange(socket, &request).await?;
        }

        match response[4] {
            S2A_INFO => parse_info(&response[5..]),
            S2A_INFO_GOLDSRC => Err(QueryError::Protocol(
                "obsolete GoldSource info response".to_string(),
            )),
            other => Err(QueryError::Protocol(format!(
                "unexpected info response type 0x{:02X}",
                other
            ))),
        }
    }

    async fn players(&self, socket: &UdpSocket) -> Result<Vec<PlayerInfo>, QueryError> {
        let mut response = self
            .exchange(socket, &build_player_request([0xFF; 4]))
            .await?;

        if response[4] == S2C_CHALLENGE {
            let challenge = read_challenge(&response)?;
            response = self
                .exchange(socket, &build_player_request(challenge))
                .await?;
        }

        if response[4] != S2A_PLAYER {
            return Err(QueryError::Protocol(format!(
                "unexpected player response type 0x{:02X}",
                response[4]
            )));
        }

        Ok(parse_players(&response[5..]))
    }
}

#[async_trait]
impl ServerQuery for SourceQuery {
    async fn query(
        &self,
        host: &str,
        port: u16,
        _query_type: &str,
    ) -> Result<QueryResponse, QueryError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| QueryError::Network(format!("failed to bind socket: {}", e)))?;
        socket
            .connect((host, port))
            .await
            .map_err(|e| QueryError::Network(format!("failed to connect: {}", e)))?;

        let info = self.info(&socket).await?;
        tracing::debug!(
            "A2S info from {}:{}: app {}, {}/{} players",
            host,
            port,
            info.app_id,
            info.players,
            info.max_players
        );

        let players = match self.players(&socket).await {
            Ok(players) => players,
            Err(e) => {
                tracing::debug!("Player list unavailable for {}:{}: {}", host, port, e);
                Vec::new()
            }
        };

        Ok(QueryResponse {
            connect: format!("{}:{}", host, info.game_port.unwrap_or(port)),
            name: info.name,
            raw: RawGameIds {
                game: Some(info.game),
                folder: Some(info.folder),
            },
            map: info.map,
            num_players: Some(info.players as u32),
            max_players: info.max_players as u32,
            players,
        })
    }
}

/// Decoded `S2A_INFO` payload.
#[derive(Debug, Clone, PartialEq)]
struct ServerInfo {
    name: String,
    map: String,
    folder: String,
    game: String,
    app_id: u16,
    players: u8,
    max_players: u8,
    game_port: Option<u16>,
}

fn build_info_request(challenge: Option<[u8; 4]>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(29);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(A2S_INFO);
    packet.extend_from_slice(b"Source Engine Query\0");
    if let Some(challenge) = challenge {
        packet.extend_from_slice(&challenge);
    }
    packet
}

fn build_player_request(challenge: [u8; 4]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(9);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(A2S_PLAYER);
    packet.extend_from_slice(&challenge);
    packet
}

fn read_challenge(response: &[u8]) -> Result<[u8; 4], QueryError> {
    response
        .get(5..9)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| QueryError::Protocol("truncated challenge".to_string()))
}

fn parse_info(payload: &[u8]) -> Result<ServerInfo, QueryError> {
    let mut r = PacketReader::new(payload);

    let _protocol = r.u8()?;
    let name = r.cstring()?;
    let map = r.cstring()?;
    let folder = r.cstring()?;
    let game = r.cstring()?;
    let app_id = r.u16_le()?;
    let players = r.u8()?;
    let max_players = r.u8()?;
    let _bots = r.u8()?;
    let _server_type = r.u8()?;
    let _environment = r.u8()?;
    let _visibility = r.u8()?;
    let _vac = r.u8()?;
    if app_id == THE_SHIP_APP_ID {
        // mode, witnesses, duration
        r.skip(3)?;
    }
    let _version = r.cstring()?;

    let game_port = match r.u8() {
        Ok(edf) if edf & EDF_PORT != 0 => r.u16_le().ok(),
        _ => None,
    };

    Ok(ServerInfo {
        name,
        map,
        folder,
        game,
        app_id,
        players,
        max_players,
        game_port,
    })
}

/// Decode an `S2A_PLAYER` payload, keeping every complete entry.
fn parse_players(payload: &[u8]) -> Vec<PlayerInfo> {
    let mut r = PacketReader::new(payload);
    let count = match r.u8() {
        Ok(n) => n,
        Err(_) => return Vec::new(),
    };

    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match read_player(&mut r) {
            Ok(player) => players.push(player),
            Err(_) => break,
        }
    }
    players
}

fn read_player(r: &mut PacketReader<'_>) -> Result<PlayerInfo, QueryError> {
    let _index = r.u8()?;
    let name = r.cstring()?;
    let score = r.i32_le()?;
    let duration = r.f32_le()?;

    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(name));
    let mut raw = Map::new();
    raw.insert("score".to_string(), json!(score));
    raw.insert("time".to_string(), json!(duration as f64));
    Ok(PlayerInfo::new(fields, raw))
}

/// Little-endian cursor over a response payload.
struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], QueryError> {
        let end = self.pos + n;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| QueryError::Protocol(format!("packet truncated at byte {}", self.pos)))?;
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), QueryError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, QueryError> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16, QueryError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i32_le(&mut self) -> Result<i32, QueryError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32_le(&mut self) -> Result<f32, QueryError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstring(&mut self) -> Result<String, QueryError> {
        let rest = &self.buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| QueryError::Protocol("unterminated string".to_string()))?;
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::AttributeLookup;

    fn info_payload(app_id: u16, edf_port: Option<u16>) -> Vec<u8> {
        let mut p = vec![17];
        p.extend_from_slice(b"My ^1Server\0de_dust2\0csgo\0Counter-Strike\0");
        p.extend_from_slice(&app_id.to_le_bytes());
        p.extend_from_slice(&[5, 24, 0, b'd', b'l', 0, 1]);
        if app_id == THE_SHIP_APP_ID {
            p.extend_from_slice(&[0, 3, 60]);
        }
        p.extend_from_slice(b"1.38.0.1\0");
        if let Some(port) = edf_port {
            p.push(EDF_PORT);
            p.extend_from_slice(&port.to_le_bytes());
        }
        p
    }

    #[test]
    fn test_build_requests() {
        let info = build_info_request(None);
        assert_eq!(info.len(), 25);
        assert_eq!(&info[..5], &[0xFF, 0xFF, 0xFF, 0xFF, 0x54]);
        assert_eq!(*info.last().unwrap(), 0);

        let info = build_info_request(Some([1, 2, 3, 4]));
        assert_eq!(&info[25..], &[1, 2, 3, 4]);

        let player = build_player_request([0xFF; 4]);
        assert_eq!(player, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(&info_payload(730, Some(27016))).unwrap();
        assert_eq!(info.name, "My ^1Server");
        assert_eq!(info.map, "de_dust2");
        assert_eq!(info.folder, "csgo");
        assert_eq!(info.game, "Counter-Strike");
        assert_eq!(info.app_id, 730);
        assert_eq!(info.players, 5);
        assert_eq!(info.max_players, 24);
        assert_eq!(info.game_port, Some(27016));
    }

    #[test]
    fn test_parse_info_the_ship_and_no_edf() {
        let info = parse_info(&info_payload(THE_SHIP_APP_ID, None)).unwrap();
        assert_eq!(info.app_id, THE_SHIP_APP_ID);
        assert_eq!(info.game_port, None);
    }

    #[test]
    fn test_parse_info_truncated() {
        let payload = info_payload(730, None);
        assert!(parse_info(&payload[..10]).is_err());
    }

    #[test]
    fn test_parse_players() {
        let mut p = vec![2];
        p.push(0);
        p.extend_from_slice(b"alice\0");
        p.extend_from_slice(&15i32.to_le_bytes());
        p.extend_from_slice(&120.5f32.to_le_bytes());
        p.push(1);
        p.extend_from_slice(b"bob\0");
        p.extend_from_slice(&(-2i32).to_le_bytes());
        // second entry cut short
        p.extend_from_slice(&[0, 0]);

        let players = parse_players(&p);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name().as_deref(), Some("alice"));
        assert_eq!(players[0].attribute("score").as_deref(), Some("15"));
        assert_eq!(players[0].attribute("time").as_deref(), Some("120.5"));
    }

    #[test]
    fn test_read_challenge() {
        let resp = [0xFF, 0xFF, 0xFF, 0xFF, S2C_CHALLENGE, 9, 8, 7, 6];
        assert_eq!(read_challenge(&resp).unwrap(), [9, 8, 7, 6]);
        assert!(read_challenge(&resp[..7]).is_err());
    }

    #[tokio::test]
    async fn test_query_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 1400];
            let challenge = [0x11, 0x22, 0x33, 0x44];
            loop {
                let (n, peer) = server.recv_from(&mut buf).await.unwrap();
                let req = &buf[..n];
                let mut resp = SIMPLE_HEADER.to_vec();
                match req[4] {
                    A2S_INFO if n == 25 => {
                        resp.push(S2C_CHALLENGE);
                        resp.extend_from_slice(&challenge);
                    }
                    A2S_INFO => {
                        assert_eq!(&req[25..], &challenge);
                        resp.push(S2A_INFO);
                        resp.extend_from_slice(&info_payload(730, None));
                    }
                    A2S_PLAYER if req[5..9] == [0xFF; 4] => {
                        resp.push(S2C_CHALLENGE);
                        resp.extend_from_slice(&challenge);
                    }
                    A2S_PLAYER => {
                        resp.push(S2A_PLAYER);
                        resp.push(1);
                        resp.push(0);
                        resp.extend_from_slice(b"alice\0");
                        resp.extend_from_slice(&3i32.to_le_bytes());
                        resp.extend_from_slice(&1.0f32.to_le_bytes());
                    }
                    _ => continue,
                }
                server.send_to(&resp, peer).await.unwrap();
            }
        });

        let query = SourceQuery::new(Duration::from_secs(2));
        let res = query.query("127.0.0.1", port, "csgo").await.unwrap();

        assert_eq!(res.connect, format!("127.0.0.1:{}", port));
        assert_eq!(res.name, "My ^1Server");
        assert_eq!(res.raw.game.as_deref(), Some("Counter-Strike"));
        assert_eq!(res.raw.folder.as_deref(), Some("csgo"));
        assert_eq!(res.num_players, Some(5));
        assert_eq!(res.max_players, 24);
        assert_eq!(res.players.len(), 1);
        assert_eq!(res.players[0].name().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_query_times_out() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let query = SourceQuery::new(Duration::from_millis(100));
        let err = query.query("127.0.0.1", port, "csgo").await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }
}
