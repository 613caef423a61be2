//! Static API documentation page.

use axum::response::{Html, IntoResponse, Response};

const DOCS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>COG Tiler API</title>
<style>
  body { font-family: -apple-system, sans-serif; max-width: 900px; margin: 40px auto; padding: 0 20px; color: #222; }
  h1 { border-bottom: 2px solid #2d4a6f; padding-bottom: 8px; }
  code { background: #f4f4f4; padding: 2px 5px; border-radius: 3px; font-size: 0.9em; }
  .endpoint { margin: 24px 0; }
  .endpoint h3 { margin-bottom: 4px; }
  table { border-collapse: collapse; width: 100%; font-size: 0.9em; }
  td, th { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
</style>
</head>
<body>
<h1>COG Tiler API</h1>
<p>Renders web map tiles on demand from Cloud-Optimized GeoTIFFs. Every
endpoint takes a <code>url</code> query parameter pointing at the source
raster.</p>

<div class="endpoint">
<h3><code>GET /{z}/{x}/{y}[@{scale}x][.{ext}]</code></h3>
<p>Render one XYZ tile. Extensions: <code>png</code>, <code>jpg</code>,
<code>webp</code>, <code>tif</code>; omitted, the format is picked from the
tile's mask (PNG when transparent, JPEG when opaque).</p>
<table>
<tr><th>Parameter</th><th>Meaning</th></tr>
<tr><td><code>indexes</code></td><td>1-based band selection, e.g. <code>3,2,1</code></td></tr>
<tr><td><code>expr</code></td><td>band math, e.g. <code>(b4-b1)/(b4+b1)</code> (exclusive with <code>indexes</code>)</td></tr>
<tr><td><code>nodata</code></td><td>nodata override; <code>nan</code> accepted</td></tr>
<tr><td><code>rescale</code></td><td><code>min,max</code> per band (repeatable; single pair broadcast)</td></tr>
<tr><td><code>color_formula</code></td><td>e.g. <code>gamma rgb 1.8, saturation 1.2</code></td></tr>
<tr><td><code>color_map</code></td><td>named palette (<code>viridis</code>, ...) or JSON class map</td></tr>
</table>
</div>

<div class="endpoint">
<h3><code>GET /tilejson.json</code></h3>
<p>TileJSON 2.1.0 document; rendering parameters are forwarded onto the tile
URL template (<code>tile_format</code>/<code>tile_scale</code> control the
template itself).</p>
</div>

<div class="endpoint">
<h3><code>GET /bounds</code> · <code>GET /metadata</code> · <code>GET /point</code></h3>
<p>Dataset WGS84 bounds; per-band statistics (<code>pmin</code>,
<code>pmax</code>, <code>histogram_bins</code>, <code>histogram_range</code>,
<code>max_size</code>); band values at <code>lon</code>/<code>lat</code>.</p>
</div>

<div class="endpoint">
<h3><code>GET /wmts</code></h3>
<p>WMTS 1.0.0 GetCapabilities wrapping the tile endpoint.</p>
</div>
</body>
</html>"#;

pub async fn docs_handler() -> Response {
    Html(DOCS_HTML).into_response()
}
