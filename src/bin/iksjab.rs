/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::env;
use std::process::ExitCode;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use iksjab::ClientEvent;
use iksjab::Element;
use iksjab::Jid;
use iksjab::MessageType;
use iksjab::Session;
use iksjab::XmppClientBuilder;
use iksjab::XmppHandler;

fn print_version() {
    println!("iksjab (iksemel) v{}", iksjab::VERSION);
}

fn print_usage() {
    println!(concat!(
        "Usage: iksjab [OPTIONS]\n",
        "This tool can communicate over XMPP.\n",
        "Options:\n",
        "  -j, --jid <JID>           Jabber ID\n",
        "  -p, --password <PASS>     Password (prompted if not given)\n",
        "  -s, --server <HOST:PORT>  Connect to this server instead of resolving\n",
        "  -t, --to <JID>            Recipient of the message\n",
        "  -m, --message <TEXT>      Send a message and disconnect\n",
        "  -d, --debug               Log protocol traffic\n",
        "  -h, --help                Display this help message and exit\n",
        "  -v, --version             Display the version and exit\n",
        "Without a message, incoming messages are printed until interrupted.\n",
        "Report issues at https://github.com/meduketto/iksemel-rust/issues"
    ));
}

struct Cli {
    to: Option<String>,
    message: Option<String>,
}

impl XmppHandler for Cli {
    fn handle_event(&mut self, session: &mut Session, event: &ClientEvent) {
        match event {
            ClientEvent::Active => {
                eprintln!("Connected as {}", session.jid());
                if let (Some(to), Some(body)) = (&self.to, &self.message) {
                    let message = Element::message(to, MessageType::Chat, body);
                    if let Err(err) = session.send(&message) {
                        eprintln!("Error: {err}");
                    }
                    session.close();
                }
            }
            ClientEvent::Error(err) => eprintln!("Error: {err}"),
            event => debug!(?event, "client event"),
        }
    }

    fn handle_message(&mut self, _session: &mut Session, message: &Element) {
        if let Some(body) = message.body() {
            println!("{}: {}", message.from().unwrap_or_default(), body);
        }
    }
}

fn parse_server(value: &str) -> Option<(String, Option<u16>)> {
    match value.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().ok()?;
            Some((host.to_string(), Some(port)))
        }
        Some(_) => None,
        None => Some((value.to_string(), None)),
    }
}

fn main() -> ExitCode {
    let mut args = env::args();
    let mut jid: Option<Jid> = None;
    let mut password: Option<String> = None;
    let mut server: Option<(String, Option<u16>)> = None;
    let mut to: Option<String> = None;
    let mut message: Option<String> = None;
    let mut debug = false;

    // Skip the first argument (program name)
    args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" | "--jid" => {
                if let Some(value) = args.next() {
                    jid = match Jid::new(&value) {
                        Ok(jid) => Some(jid),
                        Err(err) => {
                            eprintln!("Error: {}", err);
                            return ExitCode::FAILURE;
                        }
                    };
                } else {
                    eprintln!("Error: Jabber ID expected after {arg}");
                    return ExitCode::FAILURE;
                }
            }
            "-p" | "--password" => {
                let Some(value) = args.next() else {
                    eprintln!("Error: password expected after {arg}");
                    return ExitCode::FAILURE;
                };
                password = Some(value);
            }
            "-s" | "--server" => {
                let Some(parsed) = args.next().as_deref().and_then(parse_server) else {
                    eprintln!("Error: HOST or HOST:PORT expected after {arg}");
                    return ExitCode::FAILURE;
                };
                server = Some(parsed);
            }
            "-t" | "--to" => {
                let Some(value) = args.next() else {
                    eprintln!("Error: recipient expected after {arg}");
                    return ExitCode::FAILURE;
                };
                if let Err(err) = Jid::new(&value) {
                    eprintln!("Error: {}", err);
                    return ExitCode::FAILURE;
                }
                to = Some(value);
            }
            "-m" | "--message" => {
                let Some(value) = args.next() else {
                    eprintln!("Error: message text expected after {arg}");
                    return ExitCode::FAILURE;
                };
                message = Some(value);
            }
            "-d" | "--debug" => debug = true,
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            _ => {
                eprintln!("Error: unknown option {arg}");
                return ExitCode::FAILURE;
            }
        }
    }

    let Some(jid) = jid else {
        eprintln!("Error: Jabber ID is required");
        print_usage();
        return ExitCode::FAILURE;
    };
    if message.is_some() && to.is_none() {
        eprintln!("Error: recipient is required to send a message");
        return ExitCode::FAILURE;
    }

    let filter = if debug {
        EnvFilter::new("iksjab=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let password = match password {
        Some(password) => password,
        None => match rpassword::prompt_password("Password: ") {
            Ok(password) => password,
            Err(err) => {
                eprintln!("Error: cannot read password: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut builder = XmppClientBuilder::new(jid, &password);
    if let Some((host, port)) = server {
        builder = builder.server(Some(host));
        if let Some(port) = port {
            builder = builder.port(port);
        }
    }
    let mut client = match builder.build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: cannot start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut handler = Cli { to, message };
    let result = runtime.block_on(async {
        let close = client.close_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                close.close();
            }
        });
        client.run(&mut handler).await
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        // Already reported by the handler
        Err(iksjab::XmppClientError::Failed(_)) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
