#![no_std]
#![no_main]

use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;

// WiFi imports
use esp_wifi::wifi;

// Embassy-net imports
use embassy_net::{Config, Runner, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Delay;
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

// Import our library modules
use telescope_server::config;
use telescope_server::connectivity::ConnectivityState;
use telescope_server::dispatcher::MessageDispatcher;
use telescope_server::health::HealthLoop;
use telescope_server::indicator::Indicator;
use telescope_server::network::bring_up_network;
use telescope_server::topics::Topics;
use telescope_server::wifi::WiFiManager;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type StatusLed = Indicator<CriticalSectionRawMutex, Output<'static>, Delay>;

// Static cells for embassy components
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static WIFI_MANAGER_CELL: StaticCell<WiFiManager<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static INDICATOR_CELL: StaticCell<StatusLed> = StaticCell::new();
static STATE_CELL: StaticCell<ConnectivityState> = StaticCell::new();
static TOPICS_CELL: StaticCell<Topics> = StaticCell::new();

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[PANIC] {}", info);
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, wifi::WifiDevice<'static>>) -> ! {
    runner.run().await
}

// Periodic connectivity check driving the degraded LED pattern
#[embassy_executor::task]
async fn health_task(state: &'static ConnectivityState, indicator: &'static StatusLed) -> ! {
    log::info!("[HEALTH] Starting health loop");
    HealthLoop::new(state, indicator).run(&mut Delay).await
}

// Network bring-up followed by the broker session loop
#[embassy_executor::task]
async fn mqtt_task(
    wifi_manager: &'static mut WiFiManager<'static>,
    stack: Stack<'static>,
    topics: &'static Topics,
    state: &'static ConnectivityState,
    indicator: &'static StatusLed,
) -> ! {
    if let Err(e) = bring_up_network(wifi_manager, state, indicator).await {
        panic!("Network bring-up failed: {}", e);
    }

    let endpoint = match telescope_server::mqtt::broker_endpoint() {
        Ok(endpoint) => endpoint,
        Err(e) => panic!(
            "Broker address {}:{} rejected: {}",
            config::MQTT_BROKER_HOST,
            config::MQTT_BROKER_PORT,
            e
        ),
    };

    let dispatcher = MessageDispatcher::new(config::MQTT_BROKER_HOST, topics, state, indicator);
    log::info!("[MQTT] Broker client started for {}", endpoint);
    indicator.blink(config::BROKER_CLIENT_STARTED).await;

    telescope_server::mqtt::run_sessions(stack, endpoint, &dispatcher, topics.node_name()).await
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_println::logger::init_logger(log::LevelFilter::Info);
    println!("[MAIN] Telescope server {} starting up", telescope_server::VERSION);

    // Topics are derived once; an unusable node name is fatal
    let topics = match Topics::from_config() {
        Ok(topics) => TOPICS_CELL.init(topics),
        Err(e) => panic!("Node name {:?} rejected: {}", config::NODE_NAME, e),
    };
    println!(
        "[MAIN] Node {} listening on {} and {}, replying on {}",
        topics.node_name(),
        topics.broadcast_command(),
        topics.command(),
        topics.response()
    );

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let rng = Rng::new(peripherals.RNG);
    let wifi_init = match esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK) {
        Ok(wifi_init) => wifi_init,
        Err(e) => panic!("WiFi driver initialization failed: {:?}", e),
    };
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = match wifi::new(wifi_init_ref, peripherals.WIFI) {
        Ok(parts) => parts,
        Err(e) => panic!("WiFi controller creation failed: {:?}", e),
    };

    // Create embassy-net stack with DHCP configuration
    let stack_resources = STACK_RESOURCES.init(StackResources::new());
    let net_config = Config::dhcpv4(Default::default());
    let (stack, runner) = embassy_net::new(
        wifi_interfaces.sta,
        net_config,
        stack_resources,
        1234,
    );
    println!("[WIFI] Embassy-net stack created with DHCP configuration");

    let wifi_manager = WIFI_MANAGER_CELL.init(WiFiManager::new(wifi_controller, stack));

    // Status LED on GPIO2
    println!("[LED] Status LED on GPIO{}", config::LED_PIN);
    let led_pin = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let indicator = INDICATOR_CELL.init(Indicator::new(led_pin, Delay));
    let state = STATE_CELL.init(ConnectivityState::new());

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        println!("[MAIN] Spawning health task...");
        spawner.spawn(health_task(state, indicator)).ok();

        println!("[MAIN] Spawning MQTT task...");
        spawner
            .spawn(mqtt_task(wifi_manager, stack, topics, state, indicator))
            .ok();
    });
}
