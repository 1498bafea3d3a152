//! Thin client CLI
//!
//! Command-line interface for running single cache operations against a
//! server node.

use std::process;

use clap::{Parser, Subcommand};
use ignite_thin::{
    BinaryType, ClientConfig, Command, ProtocolVersion, Reply, Result, Session, ThinError, TypedValue, Value,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Thin client CLI
#[derive(Parser, Debug)]
#[command(name = "ignite-thin-cli")]
#[command(about = "Run cache operations against a data-grid node")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "10800")]
    port: u16,

    /// Protocol version announced in the handshake
    #[arg(long = "version-triple", default_value = "1.0.0")]
    version_triple: ProtocolVersion,

    /// Username (sent only together with a password)
    #[arg(short, long)]
    username: Option<String>,

    /// Password
    #[arg(long)]
    password: Option<String>,

    /// Logical type for keys (e.g. int, long, string, uuid)
    #[arg(long)]
    key_type: Option<BinaryType>,

    /// Logical type for values
    #[arg(long)]
    value_type: Option<BinaryType>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { cache: String, key: String },

    /// Put a key-value pair
    Put { cache: String, key: String, value: String },

    /// Check whether a key is present
    Contains { cache: String, key: String },

    /// Remove a key
    Remove { cache: String, key: String },

    /// Remove every entry from a cache
    Clear { cache: String },

    /// Count entries in a cache
    Size { cache: String },

    /// List cache names
    Names,

    /// Create a cache
    Create { cache: String },

    /// Destroy a cache
    Destroy { cache: String },

    /// Print every entry of a cache, page by page
    Scan {
        cache: String,

        /// Rows per page
        #[arg(long, default_value = "1024")]
        page_size: i32,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ignite_thin=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut builder = ClientConfig::builder()
        .host(&args.host)
        .port(args.port)
        .version(args.version_triple);
    if let Some(username) = &args.username {
        builder = builder.username(username);
    }
    if let Some(password) = &args.password {
        builder = builder.password(password);
    }

    let mut session = Session::open(builder.build())?;
    tracing::debug!("Connected to {}:{}", args.host, args.port);

    let key = |text: &str| typed(text, args.key_type);
    let command = match &args.command {
        Commands::Get { cache, key: k } => Command::Get { cache: cache.clone(), key: key(k.as_str())? },
        Commands::Put { cache, key: k, value } => Command::Put {
            cache: cache.clone(),
            key: key(k.as_str())?,
            value: typed(value, args.value_type)?,
        },
        Commands::Contains { cache, key: k } => Command::ContainsKey { cache: cache.clone(), key: key(k.as_str())? },
        Commands::Remove { cache, key: k } => Command::RemoveKey { cache: cache.clone(), key: key(k.as_str())? },
        Commands::Clear { cache } => Command::Clear { cache: cache.clone() },
        Commands::Size { cache } => Command::Size { cache: cache.clone() },
        Commands::Names => Command::Names,
        Commands::Create { cache } => Command::CreateCache { cache: cache.clone() },
        Commands::Destroy { cache } => Command::DestroyCache { cache: cache.clone() },
        Commands::Scan { cache, page_size } => {
            return scan(&mut session, cache, *page_size);
        }
    };

    print_reply(session.execute(&command)?);
    session.disconnect();
    Ok(())
}

fn scan(session: &mut Session, cache: &str, page_size: i32) -> Result<()> {
    let mut command = Command::Scan { cache: cache.to_string(), page_size };
    loop {
        let page = match session.execute(&command)? {
            Reply::Page(page) => page,
            other => return Err(ThinError::Protocol(format!("unexpected scan reply {:?}", other))),
        };
        for (key, value) in &page.rows {
            println!("{}\t{}", key, value);
        }
        if !page.has_more {
            break;
        }
        command = Command::ScanPage { cursor_id: page.cursor_id };
    }
    session.disconnect();
    Ok(())
}

fn print_reply(reply: Reply) {
    match reply {
        Reply::Done => println!("OK"),
        Reply::Value(Value::Null) => println!("(nil)"),
        Reply::Value(value) => println!("{}", value),
        Reply::Flag(flag) => println!("{}", flag),
        Reply::Size(size) => println!("{}", size),
        Reply::Names(names) => {
            for name in names {
                println!("{}", name);
            }
        }
        Reply::Entries(entries) => {
            for (key, value) in entries.iter() {
                println!("{}\t{}", key, value);
            }
        }
        Reply::Page(page) => {
            for (key, value) in page.rows {
                println!("{}\t{}", key, value);
            }
        }
    }
}

/// Parse command-line text as a value of the given logical type
///
/// Without a type, integers become longs and anything else a string.
fn typed(text: &str, ty: Option<BinaryType>) -> Result<TypedValue> {
    let Some(ty) = ty else {
        let value = match text.parse::<i64>() {
            Ok(n) => Value::Long(n),
            Err(_) => Value::from(text),
        };
        return Ok(TypedValue::new(value));
    };

    let invalid = || ThinError::TypeMismatch {
        type_name: ty.name(),
        value: text.to_string(),
    };
    let value = match ty {
        BinaryType::Byte
        | BinaryType::Short
        | BinaryType::Int
        | BinaryType::Long
        | BinaryType::Date
        | BinaryType::NativeLong => Value::Long(text.parse().map_err(|_| invalid())?),
        BinaryType::Float | BinaryType::Double | BinaryType::NativeDouble => {
            Value::Double(text.parse().map_err(|_| invalid())?)
        }
        BinaryType::Bool | BinaryType::NativeBool => Value::Bool(text.parse().map_err(|_| invalid())?),
        BinaryType::Uuid | BinaryType::NativeUuid => {
            Value::Uuid(uuid::Uuid::parse_str(text).map_err(|_| invalid())?)
        }
        BinaryType::ByteArray | BinaryType::NativeBytes => Value::bytes(text.as_bytes()),
        _ => Value::from(text),
    };
    Ok(TypedValue::with_type(value, ty))
}
