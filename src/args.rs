use std::str::FromStr;
use std::time::Duration;
use anyhow::Result;
use clap::ArgMatches;
use crate::settings::{HttpConfig, Settings, UdpConfig};

pub fn settings(args: &ArgMatches) -> Result<Settings> {
    let udp = UdpConfig {
        workers:         opt(args.value_of("output-udp-workers"))?.unwrap_or(0),
        timeout:         duration(args.value_of("output-udp-timeout"))?.unwrap_or(Duration::from_secs(5)),
        stats:           args.is_present("output-udp-stats"),
        ignore_response: args.is_present("output-udp-ignore-response"),
    };

    let http = HttpConfig {
        track_responses: args.is_present("output-http-track-response"),
        stats:           args.is_present("output-http-stats"),
        stats_ms:        opt(args.value_of("output-http-stats-ms"))?.unwrap_or(5000),
        original_host:   args.is_present("http-original-host"),
        redirect_limit:  opt(args.value_of("output-http-redirects"))?.unwrap_or(0),
        workers_min:     opt(args.value_of("output-http-workers-min"))?.unwrap_or(0),
        workers_max:     opt(args.value_of("output-http-workers"))?.unwrap_or(0),
        queue_len:       opt(args.value_of("output-http-queue-len"))?.unwrap_or(1000),
        timeout:         duration(args.value_of("output-http-timeout"))?.unwrap_or(Duration::from_secs(5)),
        worker_timeout:  duration(args.value_of("output-http-worker-timeout"))?.unwrap_or(Duration::from_secs(2)),
        skip_verify:     args.is_present("output-http-skip-verify"),
    };

    Ok(Settings {
        exit_after:               duration(args.value_of("exit-after"))?,
        output_stdout:            args.is_present("output-stdout"),
        output_null:              args.is_present("output-null"),
        input_udp:                values(args, "input-udp"),
        input_udp_track_response: args.is_present("input-udp-track-response"),
        input_http:               values(args, "input-http"),
        output_udp:               values(args, "output-udp"),
        output_udp_config:        udp,
        output_http:              values(args, "output-http"),
        output_http_config:       http,
    })
}

pub fn opt<T: FromStr>(arg: Option<&str>) -> Result<Option<T>> {
    Ok(arg.map(|s| T::from_str(s).map_err(|_| {
        let msg  = format!("invalid argument value '{}'", s);
        let kind = clap::ErrorKind::InvalidValue;
        clap::Error::with_description(&msg, kind)
    })).transpose()?)
}

fn duration(arg: Option<&str>) -> Result<Option<Duration>> {
    Ok(opt::<humantime::Duration>(arg)?.map(Into::into))
}

fn values(args: &ArgMatches, name: &str) -> Vec<String> {
    args.values_of(name).map(|vs| vs.map(String::from).collect()).unwrap_or_default()
}
