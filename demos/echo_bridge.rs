use std::sync::Arc;

use relay_rpc::{
    // ---
    CommandContext,
    EventKind,
    HostDispatcherBuilder,
    LocalServices,
    MemoryChannel,
    Result,
    RpcClient,
    RpcConfig,
    SessionId,
    StreamEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GreetingReply {
    code: i64,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    env_logger::init();
    let config = RpcConfig::new("echo");

    let mut services = LocalServices::new(&config);
    services.register_unary("greet.Greeter.sayHello", |req: Greeting| async move {
        Ok(GreetingReply {
            code: 1,
            text: format!("hello, {}", req.name),
        })
    })?;
    services.register_stream("greet.Greeter.chat", |_body, mut io| async move {
        while let Some(line) = io.recv().await {
            io.send(json!({ "echo": line })).await?;
        }
        Ok(())
    })?;

    let host = HostDispatcherBuilder::new(Arc::new(services))
        .config(config.clone())
        .command("workbench.showMessage", |ctx: CommandContext, text: String| async move {
            println!("[{}] {text}", ctx.session);
            Ok(true)
        })
        .build();

    let (host_channel, client_channel) = MemoryChannel::pair(&config);
    let _session = host.attach(SessionId::generate("demo"), host_channel).await?;
    let client = RpcClient::with_channel(client_channel.clone(), config).await?;

    // Unary: the address is resolved to `greet.Greeter.sayHello` on the host.
    let reply: GreetingReply = client
        .call_typed("greet.Greeter.SayHello", &Greeting { name: "Roxy".into() })
        .await?;
    println!("{}", reply.text);

    // Stream
    let stream = client.stream("greet.Greeter.chat", json!({}))?;
    stream.on(EventKind::Data, |event| {
        if let StreamEvent::Data(data) = event {
            println!("stream data: {data}");
        }
    });

    stream.start().await?;
    for line in ["one", "two", "three"] {
        stream.write(json!(line)).await?;
    }

    // Command
    client.command("workbench.showMessage", json!("stream running")).await?;

    // Ending locally drops whatever the host still sends for this stream.
    stream.end().await?;
    println!("stream is {}", stream.state());

    client_channel.close().await?;
    Ok(())
}
