use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use rpcframe_protocol::{
    Datum, DeclaredTypes, Protocol, ProtocolConfig, ProtocolError, TypeRegistry, Value,
    ValueDecoder,
};
use rpcframe_transport::MemoryTransport;

use crate::cmd::{split_pair, DumpArgs, DumpMode};
use crate::exit::{io_error, protocol_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{datum_to_json, print_message, print_values, FieldReport, MessageReport, OutputFormat};

/// Values in a response frame that carries no result: start code, validity flag, end code.
const EMPTY_RESPONSE_VALUES: usize = 3;

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let message = read_input(&args.input)?;
    tracing::debug!(len = message.len(), mode = ?args.mode, "decoding message");

    match args.mode {
        DumpMode::Values => {
            let values = decode_values(&message, args.chunk_size)
                .map_err(|err| protocol_error("decoding values failed", err))?;
            print_values(&values, message.len(), format);
        }
        DumpMode::Request | DumpMode::Response => {
            let registry = build_registry(&args.models, &args.enums)?;
            let report = if args.mode == DumpMode::Request {
                read_request(message, registry, args.chunk_size)
                    .map_err(|err| protocol_error("decoding request failed", err))?
            } else {
                read_response(message, registry, args.chunk_size)
                    .map_err(|err| protocol_error("decoding response failed", err))?
            };
            print_message(&report, format);
        }
    }
    Ok(SUCCESS)
}

fn read_input(path: &Path) -> CliResult<Bytes> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed reading stdin", err))?;
        return Ok(Bytes::from(buf));
    }
    fs::read(path)
        .map(Bytes::from)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

/// Decode the flat value sequence, feeding the decoder `chunk_size` bytes at a time.
pub fn decode_values(message: &[u8], chunk_size: usize) -> rpcframe_protocol::Result<Vec<Value>> {
    let mut decoder = ValueDecoder::new();
    let mut values = Vec::new();
    for chunk in message.chunks(chunk_size.max(1)) {
        decoder.push(chunk);
        while let Some(value) = decoder.decode_next()? {
            values.push(value);
        }
    }
    if decoder.buffered() > 0 {
        return Err(ProtocolError::TruncatedMessage);
    }
    Ok(values)
}

pub fn build_registry(models: &[String], enums: &[String]) -> CliResult<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    for model in models {
        if model.is_empty() {
            return Err(CliError::new(USAGE, "--model expects a type name"));
        }
        registry.register_model(model.as_str());
    }
    for decl in enums {
        let (name, variants) = split_pair("--enum", decl)?;
        registry.register_enum(name, variants.split(',').filter(|v| !v.is_empty()));
    }
    Ok(registry)
}

fn open(message: Bytes, registry: TypeRegistry, chunk_size: usize) -> Protocol<MemoryTransport> {
    let config = ProtocolConfig {
        chunk_size,
        ..ProtocolConfig::default()
    };
    Protocol::with_config(
        MemoryTransport::with_incoming([message]),
        Arc::new(registry),
        config,
    )
}

fn field(name: String, datum: &Datum, types: &dyn DeclaredTypes) -> FieldReport {
    FieldReport {
        name,
        kind: datum.kind().to_string(),
        value: datum_to_json(datum, types),
        display: match datum {
            Datum::Enum(value) => crate::output::enum_label(value, types),
            other => other.to_string(),
        },
    }
}

pub fn read_request(
    message: Bytes,
    registry: TypeRegistry,
    chunk_size: usize,
) -> rpcframe_protocol::Result<MessageReport> {
    let size = message.len();
    let mut protocol = open(message, registry, chunk_size);

    let header = protocol.read_request_start()?;
    let mut fields = Vec::with_capacity(header.argument_count.min(1024));
    for _ in 0..header.argument_count {
        let argument = protocol.read_argument_start()?;
        let datum = protocol.read_datum()?;
        protocol.read_argument_end()?;
        fields.push(field(argument.name, &datum, &**protocol.registry()));
    }
    protocol.read_request_end()?;

    Ok(MessageReport {
        frame: "request",
        size,
        method: Some(header.method_name),
        tags: header.tags,
        fields,
        ..MessageReport::default()
    })
}

pub fn read_response(
    message: Bytes,
    registry: TypeRegistry,
    chunk_size: usize,
) -> rpcframe_protocol::Result<MessageReport> {
    let size = message.len();
    // The result is optional; count values to tell whether one follows.
    let has_body = decode_values(&message, chunk_size)?.len() > EMPTY_RESPONSE_VALUES;
    let mut protocol = open(message, registry, chunk_size);

    let header = protocol.read_response_start()?;
    let mut report = MessageReport {
        frame: "response",
        size,
        valid: Some(header.is_valid),
        ..MessageReport::default()
    };
    if !header.is_valid {
        report.error = Some(protocol.read_error()?.into_error().to_string());
    } else if has_body {
        let datum = protocol.read_datum()?;
        report
            .fields
            .push(field("result".to_string(), &datum, &**protocol.registry()));
    }
    protocol.read_response_end()?;
    Ok(report)
}
