use clap::Parser;
use std::io::{self, Write};
use tether::headers::HeaderName;
use tether::{Credentials, Endpoint, EndpointConfig, Method, RequestOptions};
use tokio::{runtime::Builder, task::LocalSet};

/// Send requests over a single endpoint connection.
#[derive(Parser, Debug)]
struct Args {
    /// Request url, e.g: http://localhost:3000/index.html
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request header, `Name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Digest credentials, `user:pass`
    #[arg(long, conflicts_with = "ntlm")]
    digest: Option<String>,
    /// NTLM credentials, `user:pass[@domain]`
    #[arg(long)]
    ntlm: Option<String>,
    /// Number of times the request is sent
    #[arg(long, default_value_t = 1)]
    repeat: usize,
    /// Pipeline repeated requests
    #[arg(long)]
    pipeline: bool,
    /// Inactivity timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(LocalSet::new().run_until(run(args)))
}

async fn run(args: Args) -> io::Result<()> {
    let method = args.method.parse::<Method>().map_err(io::Error::other)?;
    let target = tether::http::Target::parse(&args.url).map_err(io::Error::other)?;

    let config = EndpointConfig {
        inactivity_timeout: std::time::Duration::from_secs(args.timeout),
        ..Default::default()
    };
    let endpoint = Endpoint::new(&args.url, config).map_err(io::Error::other)?;

    let mut options = RequestOptions::new()
        .path(target.path())
        .pipeline(args.pipeline);
    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            return Err(io::Error::other(format!("invalid header {header:?}")));
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(io::Error::other)?;
        options = options.header(name, value.trim().to_owned());
    }
    if let Some(data) = args.data {
        options = options.body(data);
    }
    if let Some(digest) = &args.digest {
        let (user, pass) = digest.split_once(':').unwrap_or((digest, ""));
        options = options.credentials(Credentials::digest(user, pass));
    }
    if let Some(ntlm) = &args.ntlm {
        let (user, rest) = ntlm.split_once(':').unwrap_or((ntlm, ""));
        let (pass, domain) = rest.split_once('@').unwrap_or((rest, ""));
        options = options.credentials(Credentials::ntlm(user, pass, domain));
    }

    let futures = (0..args.repeat.max(1))
        .map(|_| endpoint.request(method, options.clone()))
        .collect::<Vec<_>>();

    for future in futures {
        let result = future.await;
        let mut stdout = io::stdout().lock();
        match result {
            Ok(res) => {
                writeln!(stdout, "{} {} {}", res.version(), res.status(), res.reason())?;
                for field in res.headers() {
                    writeln!(stdout, "{}: {}", field.name().as_str(), field.value().as_str_lossy())?;
                }
                for (name, value) in res.cookies() {
                    writeln!(stdout, "# cookie {name}={value}")?;
                }
                writeln!(stdout)?;
                stdout.write_all(res.body())?;
                writeln!(stdout)?;
            }
            Err(err) => writeln!(stdout, "error: {err}")?,
        }
    }

    Ok(())
}
