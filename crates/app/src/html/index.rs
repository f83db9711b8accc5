/// Landing page: the live feed, plus a small status line polled from `/status`.
pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Camera stream</title>
  <style>
    body { margin: 0; background: #111; color: #9f9; font-family: monospace; }
    main { display: flex; flex-direction: column; align-items: center; padding: 1rem; gap: 0.5rem; }
    img { max-width: 100%; border: 1px solid #333; background: #000; }
  </style>
</head>
<body>
  <main>
    <img src="/video_feed" alt="live camera feed">
    <div id="status">connecting…</div>
  </main>
  <script>
    async function poll() {
      try {
        const s = await (await fetch('/status')).json();
        document.getElementById('status').textContent = s.streaming
          ? `${s.device} · ${s.fps.toFixed(1)} fps · ${s.frames_sent} frames`
          : (s.last_error || 'idle');
      } catch (_) {}
    }
    setInterval(poll, 2000);
    poll();
  </script>
</body>
</html>
"#;
