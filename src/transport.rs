use std::io::{self, Write};

use serde::Serialize;

#[derive(Serialize)]
struct JsonRpcResponse<'a> {
    jsonrpc: &'a str,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Serialize)]
struct JsonRpcErrorBody {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

/// Writes one JSON-RPC message per line.
pub struct NdjsonTransport<W: Write> {
    writer: W,
}

impl NdjsonTransport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> NdjsonTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_response(&mut self, id: u64, result: serde_json::Value) {
        self.write_line(&JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        });
    }

    pub fn write_error(
        &mut self,
        id: u64,
        code: i32,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        self.write_line(&JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody {
                code,
                message: message.into(),
                data,
            }),
        });
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, value: &impl Serialize) {
        let line = match serde_json::to_string(value) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to serialize: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            tracing::error!("Failed to write response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(transport: NdjsonTransport<Vec<u8>>) -> Vec<serde_json::Value> {
        let out = String::from_utf8(transport.into_inner()).unwrap();
        out.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn response_is_one_line_without_error_field() {
        let mut t = NdjsonTransport::new(Vec::new());
        t.write_response(7, serde_json::json!({ "ok": true }));
        let msgs = lines(t);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["jsonrpc"], "2.0");
        assert_eq!(msgs[0]["id"], 7);
        assert_eq!(msgs[0]["result"]["ok"], true);
        assert!(msgs[0].get("error").is_none());
    }

    #[test]
    fn error_skips_absent_data() {
        let mut t = NdjsonTransport::new(Vec::new());
        t.write_error(1, -32601, "Unknown method: nope", None);
        t.write_error(2, -32000, "boom", Some(serde_json::json!({ "vfsCode": "X" })));
        let msgs = lines(t);
        assert_eq!(msgs[0]["error"]["code"], -32601);
        assert!(msgs[0]["error"].get("data").is_none());
        assert_eq!(msgs[1]["error"]["data"]["vfsCode"], "X");
    }
}
