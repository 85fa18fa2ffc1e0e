mod config;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::PerpkitConfig;
use perpkit_brokers_common::SimulatedExchange;
use perpkit_brokers_crypto::ohlcv::candle_windows;
use perpkit_brokers_crypto::BitmartPerp;
use perpkit_core::*;
use perpkit_data::CsvCandleStore;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "perpkit")]
#[command(about = "Perpetual-futures adapter toolkit, run against a simulated exchange")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to a perpkit.toml config file
    #[arg(short, long, env = "PERPKIT_CONFIG")]
    config: Option<PathBuf>,

    /// JSON fixture seeding the simulated exchange (overrides the config)
    #[arg(long)]
    fixture: Option<PathBuf>,

    #[arg(long, env = "PERPKIT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "PERPKIT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[arg(long, env = "PERPKIT_UID", hide_env_values = true)]
    uid: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the request windows a candle fetch would issue
    Windows {
        #[arg(short, long, default_value = "1h")]
        timeframe: Timeframe,

        #[arg(long, default_value = "1000")]
        limit: u32,

        /// End of the range in epoch milliseconds (default: now)
        #[arg(long)]
        end_ms: Option<i64>,
    },

    /// Fetch the most recent candles for a pair
    Ohlcv {
        pair: String,

        #[arg(short, long, default_value = "1h")]
        timeframe: Timeframe,

        #[arg(long, default_value = "100")]
        limit: u32,

        #[arg(long)]
        end_ms: Option<i64>,

        /// Directory to store the candles in as CSV
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the quote-currency balance
    Balance,

    /// List open positions
    Positions { pairs: Vec<String> },

    /// Set margin mode and leverage for a pair
    Leverage {
        pair: String,
        /// "cross" or "isolated"
        margin_mode: String,
        leverage: u32,
    },

    /// Place an order (limit when --price is given, trigger when
    /// --trigger-price is given)
    Place {
        pair: String,
        side: Side,
        /// Size in underlying-asset units
        size: Decimal,

        #[arg(long)]
        price: Option<Decimal>,

        #[arg(long)]
        trigger_price: Option<Decimal>,

        #[arg(long)]
        reduce: bool,

        #[arg(long, default_value = "cross")]
        margin_mode: MarginMode,

        #[arg(long, default_value = "1")]
        leverage: u32,

        /// Log failures instead of exiting with an error
        #[arg(long)]
        lenient: bool,
    },

    /// Look up an order by id
    Order { pair: String, id: String },

    /// List working orders
    Orders {
        pair: String,

        #[arg(long)]
        trigger: bool,
    },

    /// Cancel orders (all of the pair's orders when no ids are given)
    Cancel {
        pair: String,
        ids: Vec<String>,

        #[arg(long)]
        trigger: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => PerpkitConfig::load(path)?,
        None => PerpkitConfig::default(),
    };
    config.override_credentials(cli.api_key, cli.secret, cli.uid);
    if let Some(fixture) = cli.fixture {
        config.simulator.fixture = Some(fixture);
    }

    // Pure computation, no exchange needed.
    if let Commands::Windows {
        timeframe,
        limit,
        end_ms,
    } = &cli.command
    {
        let end_ms = end_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
        let windows = candle_windows(
            end_ms,
            *limit,
            *timeframe,
            config.adapter.max_candles_per_request,
        );
        if cli.json {
            return print_json(&windows);
        }
        println!("{} request(s) for {} x {}", windows.len(), limit, timeframe);
        for w in &windows {
            let params = w.params();
            println!(
                "  {} -> {}  (start_time={} end_time={})",
                w.start_ms, w.end_ms, params["start_time"], params["end_time"]
            );
        }
        return Ok(());
    }

    let exchange = config.build_simulator()?;
    let mut adapter = BitmartPerp::new(
        config.credentials.clone(),
        config.adapter.clone(),
        |opts| exchange.open(&opts),
    );
    adapter.load_markets().await?;
    tracing::info!(
        exchange = adapter.name(),
        authenticated = adapter.is_authenticated(),
        "Adapter ready"
    );

    let outcome = run(&adapter, cli.command, cli.json).await;
    adapter.close().await?;
    outcome
}

async fn run(adapter: &BitmartPerp<SimulatedExchange>, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Windows { .. } => {}
        Commands::Ohlcv {
            pair,
            timeframe,
            limit,
            end_ms,
            out,
        } => {
            let candles = match end_ms {
                Some(end) => adapter.get_ohlcv_until(&pair, timeframe, limit, end).await?,
                None => adapter.get_last_ohlcv(&pair, timeframe, limit).await?,
            };
            tracing::info!(pair = %pair, candles = candles.len(), "Fetched candles");
            if let Some(dir) = out {
                let path = CsvCandleStore::new(dir).save(&pair, timeframe, &candles)?;
                println!("Wrote {} candles to {}", candles.len(), path.display());
            }
            if json {
                return print_json(&candles);
            }
            print_candles(&pair, timeframe, &candles);
        }
        Commands::Balance => {
            let balance = adapter.get_balance().await?;
            if json {
                return print_json(&balance);
            }
            let currency = &adapter.settings().quote_currency;
            let sep = "=".repeat(60);
            println!("\n{sep}");
            println!("  BALANCE ({})", currency);
            println!("{sep}");
            println!("  Total: {}", balance.total);
            println!("  Free:  {}", balance.free);
            println!("  Used:  {}", balance.used);
            println!("{sep}\n");
        }
        Commands::Positions { pairs } => {
            let positions = adapter.get_open_positions(&pairs).await?;
            if json {
                return print_json(&positions);
            }
            print_positions(&positions);
        }
        Commands::Leverage {
            pair,
            margin_mode,
            leverage,
        } => {
            let info = adapter
                .set_margin_mode_and_leverage(&pair, &margin_mode, leverage)
                .await?;
            print_info(&info, json)?;
        }
        Commands::Place {
            pair,
            side,
            size,
            price,
            trigger_price,
            reduce,
            margin_mode,
            leverage,
            lenient,
        } => {
            let mode = if lenient {
                ErrorMode::Lenient
            } else {
                ErrorMode::Strict
            };

            if let Some(trigger_price) = trigger_price {
                let mut request = match price {
                    Some(price) => {
                        PlaceTriggerOrderRequest::limit(&pair, side, price, trigger_price, size)
                    }
                    None => PlaceTriggerOrderRequest::market(&pair, side, trigger_price, size),
                }
                .with_margin_mode(margin_mode);
                if reduce {
                    request = request.reduce_only();
                }
                match adapter.place_trigger_order(request, mode).await? {
                    Some(info) => print_info(&info, json)?,
                    None => println!("Trigger order was not placed (see log)"),
                }
                return Ok(());
            }

            let mut request = match price {
                Some(price) => PlaceOrderRequest::limit(&pair, side, price, size),
                None => PlaceOrderRequest::market(&pair, side, size),
            }
            .with_margin_mode(margin_mode)
            .with_leverage(leverage);
            if reduce {
                request = request.reduce_only();
            }
            match adapter.place_order(request, mode).await? {
                Some(order) if json => print_json(&order)?,
                Some(order) => print_orders(&[order]),
                None => println!("Order was not placed (see log)"),
            }
        }
        Commands::Order { pair, id } => {
            let order = adapter.get_order_by_id(&id, &pair).await?;
            if json {
                return print_json(&order);
            }
            print_orders(&[order]);
        }
        Commands::Orders { pair, trigger } => {
            if trigger {
                let orders = adapter.get_open_trigger_orders(&pair).await?;
                if json {
                    return print_json(&orders);
                }
                print_trigger_orders(&orders);
            } else {
                let orders = adapter.get_open_orders(&pair).await?;
                if json {
                    return print_json(&orders);
                }
                print_orders(&orders);
            }
        }
        Commands::Cancel { pair, ids, trigger } => {
            let info = if trigger {
                adapter.cancel_trigger_orders(&pair, &ids).await
            } else {
                adapter.cancel_orders(&pair, &ids).await
            };
            print_info(&info, json)?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_info(info: &Info, json: bool) -> Result<()> {
    if json {
        return print_json(info);
    }
    let status = if info.success { "OK" } else { "FAILED" };
    println!("[{}] {}", status, info.message);
    Ok(())
}

fn print_candles(pair: &str, timeframe: Timeframe, candles: &[Candle]) {
    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  {} {} ({} candles)", pair, timeframe, candles.len());
    println!("{sep}");
    for c in candles {
        println!(
            "  {}  O {}  H {}  L {}  C {}  V {}",
            c.timestamp.format("%Y-%m-%d %H:%M"),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        );
    }
    println!("{sep}\n");
}

fn print_positions(positions: &[Position]) {
    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  OPEN POSITIONS ({})", positions.len());
    println!("{sep}");
    for p in positions {
        println!("  {} {:?} {} @ {}", p.pair, p.side, p.size, p.entry_price);
        println!("    Current Price:  {}", p.current_price);
        println!("    USD Size:       {}", p.usd_size);
        println!("    Unrealized PnL: {}", p.unrealized_pnl);
        println!("    Margin:         {} {}x", p.margin_mode, p.leverage);
        println!("    Liquidation:    {}", p.liquidation_price_or_zero());
        println!("    Take Profit:    {}", p.take_profit_price_or_zero());
        println!("    Stop Loss:      {}", p.stop_loss_price_or_zero());
        println!("    Hedged:         {}", p.is_hedged());
    }
    println!("{sep}\n");
}

fn print_orders(orders: &[Order]) {
    for o in orders {
        let price = o
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "market".to_string());
        println!(
            "  #{} {} {} {} {} @ {}  filled {} / remaining {}{}",
            o.id,
            o.pair,
            o.order_type.as_str(),
            o.side.as_str(),
            o.size,
            price,
            o.filled,
            o.remaining,
            if o.reduce { "  (reduce)" } else { "" }
        );
    }
    if orders.is_empty() {
        println!("  No open orders");
    }
}

fn print_trigger_orders(orders: &[TriggerOrder]) {
    for o in orders {
        println!(
            "  #{} {} {} {} {} trigger {} price {}{}",
            o.id,
            o.pair,
            o.order_type.as_str(),
            o.side.as_str(),
            o.size,
            o.trigger_price,
            o.price,
            if o.reduce { "  (reduce)" } else { "" }
        );
    }
    if orders.is_empty() {
        println!("  No open trigger orders");
    }
}
