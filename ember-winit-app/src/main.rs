mod app;
mod demo_scene;

use app::EmberApp;

fn main() -> anyhow::Result<()> {
    EmberApp::run()
}
